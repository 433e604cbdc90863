//! HD44780 character LCD in 8-bit parallel mode.
//!
//! Every transfer is a 9-bit scan code: bit 8 drives RS (0 = instruction,
//! 1 = data), bits 0..7 drive D0..D7. The value is latched on the falling
//! edge of E after a 1 ms setup time.

use super::DisplaySink;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::warn;

/// Pause before each character (ms).
pub const LETTER_DELAY_MS: u32 = 10;

/// Setup and hold time around the E pulse (ms).
const LATCH_DELAY_MS: u32 = 1;

/// One display transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command(u16);

impl Command {
    /// Function set: 8-bit bus, two lines, 5x8 font.
    pub const FUNCTION_SET: Self = Self(0x038);
    /// Display on, cursor off, blink off.
    pub const DISPLAY_ON: Self = Self(0x00C);
    /// Clear display.
    pub const CLEAR: Self = Self(0x001);
    /// Return home.
    pub const HOME: Self = Self(0x002);

    /// Write one character at the cursor.
    pub const fn data(byte: u8) -> Self {
        Self(0x100 | byte as u16)
    }

    /// Raw 9-bit scan code.
    pub const fn scan_code(self) -> u16 {
        self.0
    }

    /// RS level for this transfer.
    pub const fn is_data(self) -> bool {
        self.0 & 0x100 != 0
    }
}

/// HD44780 writer over ten output pins.
pub struct Hd44780<P, D> {
    rs: P,
    e: P,
    data: [P; 8],
    delay: D,
}

impl<P: OutputPin, D: DelayNs> Hd44780<P, D> {
    /// Create a writer. `data[i]` is wired to D`i`.
    pub fn new(rs: P, e: P, data: [P; 8], delay: D) -> Self {
        Self { rs, e, data, delay }
    }

    /// Two-line mode, cursor off.
    pub fn init(&mut self) -> Result<(), P::Error> {
        self.send(Command::FUNCTION_SET)?;
        self.send(Command::DISPLAY_ON)
    }

    /// Latch one scan code.
    pub fn send(&mut self, command: Command) -> Result<(), P::Error> {
        let code = command.scan_code();
        self.rs.set_state(command.is_data().into())?;
        for (bit, pin) in self.data.iter_mut().enumerate() {
            pin.set_state((code & (1 << bit) != 0).into())?;
        }
        self.delay.delay_ms(LATCH_DELAY_MS);
        self.e.set_high()?;
        self.delay.delay_ms(LATCH_DELAY_MS);
        self.e.set_low()
    }

    /// Clear, home and write `text` from the top-left corner.
    ///
    /// Text past the first line's 40 DDRAM columns continues on line two.
    pub fn write_str(&mut self, text: &str) -> Result<(), P::Error> {
        self.send(Command::CLEAR)?;
        self.send(Command::HOME)?;
        for byte in text.bytes() {
            self.delay.delay_ms(LETTER_DELAY_MS);
            self.send(Command::data(byte))?;
        }
        Ok(())
    }
}

impl<P: OutputPin, D: DelayNs> DisplaySink for Hd44780<P, D> {
    fn show(&mut self, text: &str) {
        if let Err(e) = self.write_str(text) {
            warn!("Display write failed: {:?}", e);
        }
    }
}
