/// Trait for audio modules.
pub trait AudioModule: Send {
    /// Called whenever the DAC rate changes.
    fn set_sample_rate(&mut self, sample_rate: u32);
    /// Queues interleaved stereo samples for playback.
    fn play(&mut self, samples: &[i16]);
}

/// An implementation of [`AudioModule`] which does nothing.
#[derive(Debug, Clone, Copy)]
pub struct NopAudioModule;

impl AudioModule for NopAudioModule {
    fn set_sample_rate(&mut self, _: u32) {}
    fn play(&mut self, _: &[i16]) {}
}
