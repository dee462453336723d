use core::fmt;

use bitfield::bitfield;

bitfield! {
    /// IEEE 1149.1 / ADIv5 identification register, in natural bit order.
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IdCode(u32);
    pub u8, version, _: 31, 28;
    pub u16, part_number, _: 27, 12;
    pub u8, manufacturer_bank, _: 11, 8;
    pub u8, manufacturer_identity, _: 7, 1;
    pub present, _: 0;
}

impl IdCode {
    pub fn new(value: u32) -> Self {
        IdCode(value)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Plausibility filter for values shifted out of an unknown chain.
    ///
    /// Rejects the reserved identities 0 and 1 (which also covers lines stuck
    /// low), the JEP106 continuation byte 0x7f, and bank numbers above 8.
    pub fn is_plausible(self) -> bool {
        let identity = self.manufacturer_identity();
        (2..=126).contains(&identity) && self.manufacturer_bank() <= 8
    }

    pub fn manufacturer(self) -> Option<&'static str> {
        jep106::JEP106Code::new(self.manufacturer_bank(), self.manufacturer_identity()).get()
    }
}

impl From<u32> for IdCode {
    fn from(value: u32) -> Self {
        IdCode(value)
    }
}

impl fmt::Debug for IdCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdCode({:#010x})", self.0)
    }
}

impl fmt::Display for IdCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#010x} ({}, part {:#06x}, version {})",
            self.0,
            self.manufacturer().unwrap_or("Unknown"),
            self.part_number(),
            self.version()
        )
    }
}

impl fmt::LowerHex for IdCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
