use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use color_eyre::eyre::OptionExt;

/// A 2-byte Data Identifier given on the command line as 4 hex digits
/// (e.g. `F190`).
#[derive(Debug, Clone, Copy)]
pub struct DidArg(pub u16);

impl FromStr for DidArg {
    type Err = color_eyre::eyre::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let value = u16::from_str_radix(s, 16)
            .ok()
            .ok_or_eyre("DID must be 4 hex digits")?;
        Ok(Self(value))
    }
}

impl Display for DidArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// A byte string given on the command line as hex (e.g. `DEAD BEEF` or
/// `DEADBEEF`).
#[derive(Debug, Clone)]
pub struct HexBytesArg(pub Vec<u8>);

impl FromStr for HexBytesArg {
    type Err = color_eyre::eyre::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let cleaned: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        Ok(Self(hex::decode(&cleaned)?))
    }
}
