//! The two standard pads behind 0x4016 and 0x4017.

/// A button on a standard pad, valued by its position in the report the pad shifts out.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, derive_more::Display)]
#[repr(u8)]
pub enum Button {
    A = 0x01,
    B = 0x02,
    Select = 0x04,
    Start = 0x08,
    Up = 0x10,
    Down = 0x20,
    Left = 0x40,
    Right = 0x80,
}

/// The set of buttons held on one pad.
#[derive(Debug, Default, Clone, Copy, Hash, PartialEq, Eq, derive_more::From)]
pub struct Buttons(u8);

impl Buttons {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn with(self, button: Button) -> Self {
        Self(self.0 | button as u8)
    }

    pub const fn without(self, button: Button) -> Self {
        Self(self.0 & !(button as u8))
    }

    pub const fn contains(self, button: Button) -> bool {
        self.0 & button as u8 != 0
    }
}

impl FromIterator<Button> for Buttons {
    fn from_iter<I: IntoIterator<Item = Button>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Buttons::with)
    }
}

/// Host input is latched into the shift registers while the strobe is high; each read then
/// shifts out one button, A first. After eight reads the pad reports ones.
///
/// Pads are host input, not machine state, so they are never part of a snapshot.
#[derive(Debug, Default, Clone, Hash, PartialEq, Eq)]
pub struct Controller {
    buttons: [Buttons; 2],
    shift: [u8; 2],
    strobe: bool,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases every button and clears the shift registers and strobe.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn buttons(&self, port: usize) -> Buttons {
        self.buttons[port & 1]
    }

    pub fn set_buttons(&mut self, port: usize, buttons: Buttons) {
        self.buttons[port & 1] = buttons;
    }

    pub fn press(&mut self, port: usize, button: Button) {
        let port = port & 1;
        self.buttons[port] = self.buttons[port].with(button);
    }

    pub fn release(&mut self, port: usize, button: Button) {
        let port = port & 1;
        self.buttons[port] = self.buttons[port].without(button);
    }

    /// A write to 0x4016. Bit 0 drives the strobe of both pads.
    pub fn write(&mut self, val: u8) {
        self.strobe = val & 0x01 != 0;
        if self.strobe {
            self.latch();
        }
    }

    /// A read of 0x4016 (port 0) or 0x4017 (port 1). The upper bits are open bus and read back
    /// as the high byte of the address.
    pub fn read(&mut self, port: usize) -> u8 {
        let port = port & 1;
        if self.strobe {
            self.latch();
        }
        let bit = self.shift[port] & 0x01;
        if !self.strobe {
            self.shift[port] = (self.shift[port] >> 1) | 0x80;
        }
        bit | 0x40
    }

    /// The value the next read would return, without shifting.
    pub fn peek(&self, port: usize) -> u8 {
        let port = port & 1;
        let bit = if self.strobe {
            self.buttons[port].bits() & 0x01
        } else {
            self.shift[port] & 0x01
        };
        bit | 0x40
    }

    fn latch(&mut self) {
        self.shift = self.buttons.map(Buttons::bits);
    }
}

#[cfg(test)]
mod tests {
    use super::{Button, Buttons, Controller};

    #[test]
    fn shifts_out_a_first() {
        let mut pads = Controller::new();
        pads.set_buttons(0, [Button::A, Button::Start, Button::Right].into_iter().collect());
        pads.write(1);
        pads.write(0);
        let report: Vec<u8> = (0..10).map(|_| pads.read(0) & 0x01).collect();
        assert_eq!(report, [1, 0, 0, 1, 0, 0, 0, 1, 1, 1]);
        assert_eq!(pads.read(1), 0x40);
    }

    #[test]
    fn strobe_high_repeats_a() {
        let mut pads = Controller::new();
        pads.press(1, Button::A);
        pads.write(1);
        assert_eq!(pads.read(1), 0x41);
        assert_eq!(pads.read(1), 0x41);
        pads.release(1, Button::A);
        assert_eq!(pads.read(1), 0x40);
    }

    #[test]
    fn reset_releases_everything() {
        let mut pads = Controller::new();
        pads.press(0, Button::B);
        pads.write(1);
        pads.reset();
        assert_eq!(pads.buttons(0), Buttons::empty());
        assert_eq!(pads, Controller::default());
    }
}
