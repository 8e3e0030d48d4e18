/// Pixel format of the framebuffer scanned out by the VI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Blank,
    Rgba5551,
    Rgba8888,
}

/// Description of the framebuffer the VI is scanning out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Physical address of the first pixel.
    pub origin: u32,
    /// Line stride, in pixels.
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Trait for render modules, which receive RDP commands and VI frames.
pub trait RenderModule: Send {
    /// Executes a single RDP command. `words` holds the whole command (2 to 44 words).
    fn command(&mut self, words: &[u32], rdram: &mut [u8]);

    /// Called once per VI field with the framebuffer being displayed.
    fn frame(&mut self, frame: Frame, rdram: &[u8]);
}

/// An implementation of [`RenderModule`] which does nothing.
#[derive(Debug, Clone, Copy)]
pub struct NopRenderModule;

impl RenderModule for NopRenderModule {
    fn command(&mut self, _: &[u32], _: &mut [u8]) {}
    fn frame(&mut self, _: Frame, _: &[u8]) {}
}
