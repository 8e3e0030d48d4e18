//! PIF: boot ROM, shared RAM and the joybus controller.

use crate::{
    modules::{input::InputModule, save::SaveModule},
    system::{System, cart::SaveType},
};

/// Base of PIF ROM in the physical address space.
pub const ROM_BASE: u32 = 0x1FC0_0000;
/// Base of PIF RAM in the physical address space.
pub const RAM_BASE: u32 = 0x1FC0_07C0;
pub const RAM_LEN: usize = 64;

const CONTROL: usize = RAM_LEN - 1;

/// Bits of the PIF control byte.
mod control {
    pub const JOYBUS: u8 = 1 << 0;
    pub const TERMINATE_BOOT: u8 = 1 << 3;
    pub const ACQUIRE_CHECKSUM: u8 = 1 << 5;
    pub const CLEAR: u8 = 1 << 6;
    pub const CHECKSUM_VERIFIED: u8 = 1 << 7;
}

/// Marker set in the RX length byte of a channel with nothing attached.
const NO_DEVICE: u8 = 0x80;

#[derive(Debug)]
pub struct Pif {
    pub ram: [u8; RAM_LEN],
}

impl Default for Pif {
    fn default() -> Self {
        Self { ram: [0; RAM_LEN] }
    }
}

/// Devices reachable through the joybus.
pub struct Joybus<'a> {
    pub input: &'a mut dyn InputModule,
    pub save: &'a mut dyn SaveModule,
    pub save_type: SaveType,
}

impl Joybus<'_> {
    /// Runs every command in PIF RAM, writing responses in place.
    pub fn process(&mut self, ram: &mut [u8; RAM_LEN]) {
        let mut channel = 0;
        let mut index = 0;

        while index < CONTROL {
            match ram[index] {
                0x00 => {
                    channel += 1;
                    index += 1;
                }
                0xFD => {
                    tracing::trace!(channel, "joybus channel reset");
                    channel += 1;
                    index += 1;
                }
                0xFE => break,
                0xFF => index += 1,
                tx => {
                    let tx = (tx & 0x3F) as usize;
                    let rx_index = index + 1;
                    let start = index + 2;
                    if start > CONTROL {
                        break;
                    }

                    let rx = (ram[rx_index] & 0x3F) as usize;
                    if start + tx + rx > CONTROL {
                        tracing::warn!(channel, tx, rx, "joybus command overflows PIF RAM");
                        break;
                    }

                    let (command, response) = ram[start..start + tx + rx].split_at_mut(tx);
                    if !self.command(channel, command, response) {
                        ram[rx_index] |= NO_DEVICE;
                    }

                    index = start + tx + rx;
                    channel += 1;
                }
            }
        }
    }

    /// Executes a single command. Returns whether a device answered.
    fn command(&mut self, channel: usize, command: &[u8], response: &mut [u8]) -> bool {
        let Some(&op) = command.first() else {
            return true;
        };

        match channel {
            0..4 => self.controller(channel, op, response),
            4 if self.save_type.is_eeprom() => self.eeprom(op, &command[1..], response),
            _ => false,
        }
    }

    fn controller(&mut self, port: usize, op: u8, response: &mut [u8]) -> bool {
        let Some(state) = self.input.controller(port) else {
            return false;
        };

        match op {
            // info: standard controller, no pak
            0x00 | 0xFF => respond(response, &[0x05, 0x00, 0x02]),
            0x01 => respond(response, &state.to_bytes()),
            _ => tracing::warn!(port, "unknown controller command {op:02X}"),
        }

        true
    }

    fn eeprom(&mut self, op: u8, args: &[u8], response: &mut [u8]) -> bool {
        let kind = if self.save_type == SaveType::Eeprom16K {
            0xC0
        } else {
            0x80
        };

        match op {
            0x00 | 0xFF => respond(response, &[0x00, kind, 0x00]),
            0x04 => {
                let Some(&block) = args.first() else {
                    return true;
                };

                let len = response.len().min(8);
                self.save.read(block as usize * 8, &mut response[..len]);
            }
            0x05 => {
                let Some((&block, data)) = args.split_first() else {
                    return true;
                };

                let len = data.len().min(8);
                tracing::trace!(block, "writing EEPROM block");
                self.save.write(block as usize * 8, &data[..len]);
                respond(response, &[0x00]);
            }
            _ => tracing::warn!("unknown EEPROM command {op:02X}"),
        }

        true
    }
}

fn respond(response: &mut [u8], data: &[u8]) {
    let len = response.len().min(data.len());
    response[..len].copy_from_slice(&data[..len]);
}

impl System {
    /// Handles the control byte after the CPU or an SI DMA wrote to PIF RAM.
    pub(crate) fn pif_written(&mut self) {
        let byte = self.bus.pif.ram[CONTROL];

        if byte & control::CLEAR != 0 {
            self.bus.pif.ram.fill(0);
            return;
        }

        let mut byte = byte & !control::TERMINATE_BOOT;
        if byte & control::ACQUIRE_CHECKSUM != 0 {
            byte = (byte & !control::ACQUIRE_CHECKSUM) | control::CHECKSUM_VERIFIED;
        }

        self.bus.pif.ram[CONTROL] = byte;
    }

    /// Runs pending joybus commands before PIF RAM is read back by an SI DMA.
    pub(crate) fn pif_before_read(&mut self) {
        if self.bus.pif.ram[CONTROL] & control::JOYBUS == 0 {
            return;
        }

        let mut joybus = Joybus {
            input: self.modules.input.as_mut(),
            save: self.modules.save.as_mut(),
            save_type: self.config.save,
        };

        joybus.process(&mut self.bus.pif.ram);
        self.bus.pif.ram[CONTROL] &= !control::JOYBUS;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::modules::{
        input::ControllerState,
        save::{MemorySave, NopSaveModule},
    };

    struct OnePad(ControllerState);

    impl InputModule for OnePad {
        fn controller(&mut self, port: usize) -> Option<ControllerState> {
            (port == 0).then_some(self.0)
        }
    }

    fn ram(commands: &[u8]) -> [u8; RAM_LEN] {
        let mut ram = [0; RAM_LEN];
        ram[..commands.len()].copy_from_slice(commands);
        ram[CONTROL] = control::JOYBUS;
        ram
    }

    #[test]
    fn controller_read() {
        let mut input = OnePad(ControllerState {
            buttons: ControllerState::A | ControllerState::START,
            stick_x: -3,
            stick_y: 100,
        });
        let mut save = NopSaveModule;
        let mut joybus = Joybus {
            input: &mut input,
            save: &mut save,
            save_type: SaveType::None,
        };

        // port 0 read, port 1 read, end
        let mut ram = ram(&[
            0x01, 0x04, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, // port 0
            0x01, 0x04, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, // port 1
            0xFE,
        ]);
        joybus.process(&mut ram);

        assert_eq!(ram[3..7], [0x90, 0x00, 0xFD, 100]);
        assert_eq!(ram[8], 0x84);
        assert_eq!(ram[14], 0xFE);
    }

    #[test]
    fn skipped_channels_and_info() {
        let mut input = OnePad(ControllerState::default());
        let mut save = NopSaveModule;
        let mut joybus = Joybus {
            input: &mut input,
            save: &mut save,
            save_type: SaveType::None,
        };

        // padding, info on port 0, three empty channels, then EEPROM info with no EEPROM
        let mut ram = ram(&[
            0xFF, 0x01, 0x03, 0x00, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x01, 0x03, 0x00, 0xFF,
            0xFF, 0xFF, 0xFE,
        ]);
        joybus.process(&mut ram);

        assert_eq!(ram[4..7], [0x05, 0x00, 0x02]);
        assert_eq!(ram[11], 0x83);
    }

    #[test]
    fn eeprom_write_then_read() {
        let mut input = OnePad(ControllerState::default());
        let mut save = MemorySave::new(SaveType::Eeprom4K.size());
        let mut joybus = Joybus {
            input: &mut input,
            save: &mut save,
            save_type: SaveType::Eeprom4K,
        };

        let mut write = ram(&[
            0x00, 0x00, 0x00, 0x00, // channels 0..4
            0x0A, 0x01, 0x05, 0x02, 1, 2, 3, 4, 5, 6, 7, 8, 0xFF, 0xFE,
        ]);
        joybus.process(&mut write);
        assert_eq!(write[16], 0x00);

        let mut read = ram(&[
            0x00, 0x00, 0x00, 0x00, // channels 0..4
            0x02, 0x08, 0x04, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0xFE,
        ]);
        joybus.process(&mut read);
        assert_eq!(read[8..16], [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(save.data()[16..24], [1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
