//! Audio output for the demo: a cpal stream that drains note messages and
//! renders the group block by block.

use std::sync::Arc;

use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rtrb::{Producer, RingBuffer};
use tracing::{error, info, warn};

use saavy_group::{
    synth::{Group, SynthMessage},
    MAX_BLOCK_SIZE,
};

const MESSAGE_QUEUE_SIZE: usize = 256;

pub struct Player {
    group: Arc<Group>,
    tx: Producer<SynthMessage>,
    // dropping the stream stops playback
    _stream: cpal::Stream,
}

impl Player {
    pub fn start(group: Group) -> EyreResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| eyre!("no default output device available"))?;
        let config = device
            .default_output_config()
            .wrap_err("failed to fetch default output config")?;

        let sample_rate = config.sample_rate().0 as f32;
        let channels = config.channels() as usize;
        info!(sample_rate, channels, "audio device opened");

        group.prepare_to_play(sample_rate, MAX_BLOCK_SIZE);
        let group = Arc::new(group);

        let (tx, mut rx) = RingBuffer::<SynthMessage>::new(MESSAGE_QUEUE_SIZE);

        let render_group = group.clone();
        let mut left = vec![0.0f32; MAX_BLOCK_SIZE];
        let mut right = vec![0.0f32; MAX_BLOCK_SIZE];

        let stream = device.build_output_stream(
            &config.into(),
            move |data: &mut [f32], _| {
                let total_frames = data.len() / channels;
                let mut frames_written = 0;

                while frames_written < total_frames {
                    let frames = (total_frames - frames_written).min(MAX_BLOCK_SIZE);
                    render_group.process_block(&mut rx, &mut left[..frames], &mut right[..frames]);

                    let out = &mut data[frames_written * channels..(frames_written + frames) * channels];
                    for (frame, (&l, &r)) in out.chunks_mut(channels).zip(left.iter().zip(right.iter())) {
                        match frame {
                            [mono] => *mono = 0.5 * (l + r),
                            [first, second, rest @ ..] => {
                                *first = l;
                                *second = r;
                                rest.fill(0.0);
                            }
                            [] => {}
                        }
                    }

                    frames_written += frames;
                }
            },
            |err| error!(%err, "audio stream error"),
            None,
        )?;

        stream.play()?;

        Ok(Self {
            group,
            tx,
            _stream: stream,
        })
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    pub fn note_on(&mut self, note: u8, velocity: u8) {
        self.send(SynthMessage::NoteOn { note, velocity });
    }

    pub fn note_off(&mut self, note: u8) {
        self.send(SynthMessage::NoteOff { note, velocity: 0 });
    }

    fn send(&mut self, message: SynthMessage) {
        if self.tx.push(message).is_err() {
            warn!(?message, "message queue full, dropped");
        }
    }
}
