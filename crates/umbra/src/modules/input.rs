/// State of a standard controller, as reported over the joybus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerState {
    /// Buttons, in joybus order: A at bit 15 down to C-right at bit 0.
    pub buttons: u16,
    pub stick_x: i8,
    pub stick_y: i8,
}

impl ControllerState {
    pub const A: u16 = 1 << 15;
    pub const B: u16 = 1 << 14;
    pub const Z: u16 = 1 << 13;
    pub const START: u16 = 1 << 12;
    pub const D_UP: u16 = 1 << 11;
    pub const D_DOWN: u16 = 1 << 10;
    pub const D_LEFT: u16 = 1 << 9;
    pub const D_RIGHT: u16 = 1 << 8;
    pub const L: u16 = 1 << 5;
    pub const R: u16 = 1 << 4;
    pub const C_UP: u16 = 1 << 3;
    pub const C_DOWN: u16 = 1 << 2;
    pub const C_LEFT: u16 = 1 << 1;
    pub const C_RIGHT: u16 = 1 << 0;

    /// The four bytes a controller answers a button read with.
    pub fn to_bytes(self) -> [u8; 4] {
        let [hi, lo] = self.buttons.to_be_bytes();
        [hi, lo, self.stick_x as u8, self.stick_y as u8]
    }
}

/// Trait for controller modules.
pub trait InputModule: Send {
    /// State of the controller plugged into `port`, or `None` if nothing is plugged in.
    fn controller(&mut self, port: usize) -> Option<ControllerState>;

    /// Called once per VI field.
    fn frame(&mut self) {}
}

/// An implementation of [`InputModule`] which does nothing: every controller is always
/// disconnected.
#[derive(Debug, Clone, Copy)]
pub struct NopInputModule;

impl InputModule for NopInputModule {
    fn controller(&mut self, _: usize) -> Option<ControllerState> {
        None
    }
}
