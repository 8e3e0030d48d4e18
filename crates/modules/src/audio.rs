use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use umbra::modules::audio::AudioModule;

struct State {
    sample_rate: u32,
    samples: VecDeque<i16>,
    capacity: usize,
    dropped: u64,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    // a poisoned queue still holds valid samples
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// An implementation of [`AudioModule`] which queues samples for a host audio backend.
///
/// The queue is bounded: when the consumer falls behind, the oldest samples are dropped.
pub struct SharedAudio {
    state: Arc<Mutex<State>>,
}

/// The consumer side of a [`SharedAudio`].
#[derive(Clone)]
pub struct AudioReceiver {
    state: Arc<Mutex<State>>,
}

impl SharedAudio {
    /// Creates a queue holding at most `capacity` samples, and its consumer.
    pub fn new(capacity: usize) -> (Self, AudioReceiver) {
        let state = Arc::new(Mutex::new(State {
            sample_rate: 0,
            samples: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }));

        (
            Self {
                state: state.clone(),
            },
            AudioReceiver { state },
        )
    }
}

impl AudioModule for SharedAudio {
    fn set_sample_rate(&mut self, sample_rate: u32) {
        let mut state = lock(&self.state);
        if state.sample_rate != sample_rate {
            tracing::debug!(sample_rate, "audio sample rate changed");
            state.sample_rate = sample_rate;
        }
    }

    fn play(&mut self, samples: &[i16]) {
        let mut state = lock(&self.state);
        let state = &mut *state;

        let samples = &samples[samples.len().saturating_sub(state.capacity)..];
        let overflow = (state.samples.len() + samples.len()).saturating_sub(state.capacity);
        if overflow > 0 {
            state.samples.drain(..overflow);
            state.dropped += overflow as u64;
            tracing::trace!(overflow, "audio queue overflowed");
        }

        state.samples.extend(samples);
    }
}

impl AudioReceiver {
    /// Current sample rate of the DAC, in Hz. Zero until the game sets one.
    pub fn sample_rate(&self) -> u32 {
        lock(&self.state).sample_rate
    }

    /// Moves queued samples into `out`, returning how many were written.
    pub fn drain(&self, out: &mut [i16]) -> usize {
        let mut state = lock(&self.state);
        let count = state.samples.len().min(out.len());
        for (out, sample) in out.iter_mut().zip(state.samples.drain(..count)) {
            *out = sample;
        }

        count
    }

    /// How many samples are waiting.
    pub fn queued(&self) -> usize {
        lock(&self.state).samples.len()
    }

    /// How many samples were dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        lock(&self.state).dropped
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn samples_reach_the_receiver() {
        let (mut audio, receiver) = SharedAudio::new(16);
        audio.set_sample_rate(44_100);
        audio.play(&[1, 2, 3, 4]);

        assert_eq!(receiver.sample_rate(), 44_100);
        assert_eq!(receiver.queued(), 4);

        let mut out = [0; 3];
        assert_eq!(receiver.drain(&mut out), 3);
        assert_eq!(out, [1, 2, 3]);

        let mut out = [0; 3];
        assert_eq!(receiver.drain(&mut out), 1);
        assert_eq!(out[0], 4);
    }

    #[test]
    fn full_queue_drops_oldest() {
        let (mut audio, receiver) = SharedAudio::new(4);
        audio.play(&[1, 2, 3]);
        audio.play(&[4, 5, 6]);

        assert_eq!(receiver.dropped(), 2);

        let mut out = [0; 8];
        assert_eq!(receiver.drain(&mut out), 4);
        assert_eq!(out[..4], [3, 4, 5, 6]);
    }

    #[test]
    fn oversized_batch_keeps_its_tail() {
        let (mut audio, receiver) = SharedAudio::new(2);
        audio.play(&[1, 2, 3, 4, 5]);

        let mut out = [0; 2];
        assert_eq!(receiver.drain(&mut out), 2);
        assert_eq!(out, [4, 5]);
    }
}
