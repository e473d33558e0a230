use crate::graph::node::VoiceSource;

/// Factory for the sound source of every voice of a child synth
///
/// Configure the sound once; the child synth calls this whenever its voice
/// pool is (re)built.
pub trait VoiceFactory: Send {
    fn create_voice(&self) -> Box<dyn VoiceSource>;
}

impl<F, T> VoiceFactory for F
where
    F: Fn() -> T + Send,
    T: VoiceSource + 'static,
{
    fn create_voice(&self) -> Box<dyn VoiceSource> {
        Box::new(self())
    }
}
