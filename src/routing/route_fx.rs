use std::sync::Arc;

use crate::{
    dsp::{amplify::magnitude, mix::sum_in_place},
    routing::matrix::RoutingMatrix,
    MAX_CHANNELS,
};

/// Master effect that copies channels along the matrix's send table.
///
/// For every source channel with a send, the channel is added onto the send
/// destination in place. The route table is left to the host. While an
/// editor is shown, the peak of every channel is stored in the matrix before
/// and after the sends are applied.
pub struct RouteEffect {
    matrix: Arc<RoutingMatrix>,
}

impl RouteEffect {
    pub fn new() -> Self {
        let matrix = RoutingMatrix::new();
        matrix.set_only_enabling_allowed(false);
        Self::with_matrix(Arc::new(matrix))
    }

    pub fn with_matrix(matrix: Arc<RoutingMatrix>) -> Self {
        Self { matrix }
    }

    pub fn matrix(&self) -> &Arc<RoutingMatrix> {
        &self.matrix
    }

    /// Apply the sends to `channels`, one slice per channel. Runs under the
    /// matrix lock; channels the matrix does not know about are left alone.
    pub fn process(&self, channels: &mut [&mut [f32]]) {
        let mut data = self.matrix.lock();
        let num_channels = channels.len().min(MAX_CHANNELS);
        let mut peaks = [0.0f32; MAX_CHANNELS];

        if data.is_editor_shown() {
            for (peak, channel) in peaks.iter_mut().zip(channels.iter()) {
                *peak = magnitude(channel);
            }
            data.set_gain_values(&peaks[..num_channels], true);
        }

        for source in 0..num_channels {
            let Some(destination) = data.send_for_source(source) else {
                continue;
            };
            if destination >= num_channels {
                continue;
            }
            add_channel(channels, source, destination);
        }

        if data.is_editor_shown() {
            for (peak, channel) in peaks.iter_mut().zip(channels.iter()) {
                *peak = magnitude(channel);
            }
            data.set_gain_values(&peaks[..num_channels], false);
        }
    }
}

impl Default for RouteEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RouteEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEffect").field("matrix", &self.matrix).finish()
    }
}

/// `channels[destination] += channels[source]`. A send onto itself doubles
/// the channel.
fn add_channel(channels: &mut [&mut [f32]], source: usize, destination: usize) {
    use std::cmp::Ordering;

    match source.cmp(&destination) {
        Ordering::Equal => {
            for sample in channels[source].iter_mut() {
                *sample *= 2.0;
            }
        }
        Ordering::Less => {
            let (head, tail) = channels.split_at_mut(destination);
            sum_in_place(&mut *tail[0], &*head[source]);
        }
        Ordering::Greater => {
            let (head, tail) = channels.split_at_mut(source);
            sum_in_place(&mut *head[destination], &*tail[0]);
        }
    }
}
