use umbra::{
    carts::m64::{Movie, Sample},
    modules::input::{ControllerState, InputModule},
};

fn state(sample: Sample) -> ControllerState {
    let [b0, b1, x, y] = sample.to_joybus();
    ControllerState {
        buttons: u16::from_be_bytes([b0, b1]),
        stick_x: x as i8,
        stick_y: y as i8,
    }
}

/// An implementation of [`InputModule`] which plays back a recorded movie on the first port.
///
/// A new sample is used every VI field. Once the movie is over, the controller is left at rest.
pub struct MoviePlayback {
    movie: Movie,
    index: usize,
}

impl MoviePlayback {
    pub fn new(movie: Movie) -> Self {
        Self { movie, index: 0 }
    }

    /// Whether every sample has been played.
    pub fn finished(&self) -> bool {
        self.index >= self.movie.samples.len()
    }

    fn current(&self) -> Sample {
        self.movie
            .samples
            .get(self.index)
            .copied()
            .unwrap_or_default()
    }
}

impl InputModule for MoviePlayback {
    fn controller(&mut self, port: usize) -> Option<ControllerState> {
        (port == 0).then(|| state(self.current()))
    }

    fn frame(&mut self) {
        if self.index == self.movie.samples.len() {
            tracing::info!(samples = self.index, "movie playback finished");
        }

        self.index = self.index.saturating_add(1);
    }
}
