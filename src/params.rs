//! Typed SCPI parameters
//!
//! Values passed to QDAC-II commands are wrapped in small types that know
//! how to render themselves on the wire. This keeps the formatting rules
//! (voltage resolution, `%g` style lists, channel lists) in one place.

use std::fmt;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::instrument::Qdac2Error;

/// Highest channel number on a QDAC-II
pub const MAX_CHANNEL: u8 = 24;


/// Common behaviour of all typed parameters: render as SCPI text.
pub trait ToScpi {
    /// Render the value as it appears in a SCPI command
    fn to_scpi(&self) -> String;
}


/// Internal trigger of the instrument (`int1`, `int2`, ...)
///
/// Internal triggers are a shared, finite resource; they are handed out by
/// the internal trigger pool of a
/// [`Qdac2`][`crate::Qdac2`] and never constructed by callers directly.
/// Each trigger remembers the pool generation it was allocated in, so that
/// a trigger handed out before a reset cannot release its successor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InternalTrigger {
    number: u8,
    generation: u32,
}

impl InternalTrigger {

    pub(crate) fn new(number: u8) -> Self {
        InternalTrigger::with_generation(number, 0)
    }

    pub(crate) fn with_generation(number: u8, generation: u32) -> Self {
        InternalTrigger { number, generation }
    }

    /// The trigger number as used by `tint` and `dc:mark`
    pub fn value(&self) -> u8 {
        self.number
    }

    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }
}

impl ToScpi for InternalTrigger {
    fn to_scpi(&self) -> String {
        format!("int{}", self.number)
    }
}

impl fmt::Display for InternalTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "int{}", self.number)
    }
}


/// External trigger outputs on the back panel
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum OutputTrigger {
    Out1 = 1,
    Out2 = 2,
    Out3 = 3,
    Out4 = 4,
    Out5 = 5,
}

impl OutputTrigger {

    /// Convert a physical output trigger number into an [`OutputTrigger`].
    pub fn from_number(number: u8) -> Result<Self, Qdac2Error> {
        OutputTrigger::from_u8(number).ok_or(Qdac2Error::InvalidOutputTrigger(number))
    }

    /// The physical output trigger number
    pub fn value(&self) -> u8 {
        *self as u8
    }
}


/// Current measurement range
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CurrentRange {
    /// Low range, for leakage and sensor currents
    Low,
    /// High range
    High
}

impl ToScpi for CurrentRange {
    fn to_scpi(&self) -> String {
        match self {
            CurrentRange::Low => String::from("low"),
            CurrentRange::High => String::from("high"),
        }
    }
}


/// Validate a channel number against the channel count of the instrument
pub fn check_channel(channel: u8) -> Result<u8, Qdac2Error> {
    if channel == 0 || channel > MAX_CHANNEL {
        return Err(Qdac2Error::InvalidChannel(channel));
    }
    Ok(channel)
}


/// Reject voltages that cannot be output (NaN or infinite)
pub fn check_voltage(volts: f64) -> Result<f64, Qdac2Error> {
    if !volts.is_finite() {
        return Err(Qdac2Error::InvalidVoltage(volts));
    }
    Ok(volts)
}


/// A channel list suffix, `(@1,2,3)`
#[derive(Clone, Debug)]
pub struct ChannelList(Vec<u8>);

impl ChannelList {
    /// Channel list covering `channels`, in the given order
    pub fn new(channels: &[u8]) -> Self {
        ChannelList(channels.to_vec())
    }
}

impl ToScpi for ChannelList {
    fn to_scpi(&self) -> String {
        let numbers: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        format!("(@{})", numbers.join(","))
    }
}


/// Voltage for fixed (DC) mode. Rounded to the 1 µV resolution of the DACs
/// and printed as the shortest decimal that round-trips, always with a
/// fractional part (`0.0`, `5.0`, `0.305`).
#[derive(Clone, Copy, Debug)]
pub struct FixedVolts(pub f64);

impl ToScpi for FixedVolts {
    fn to_scpi(&self) -> String {
        let mut rounded = (self.0 * 1e6).round() / 1e6;
        // avoid `-0.0` on the wire
        if rounded == 0.0 {
            rounded = 0.0;
        }

        let repr = format!("{:?}", rounded);
        match repr.split_once('e') {
            Some((mantissa, exp)) => format!("{}e{}", mantissa, pad_exponent(exp)),
            None => repr
        }
    }
}


/// A number in `%g` notation with 6 significant digits; used for list
/// voltages, dwell times and pulse widths.
#[derive(Clone, Copy, Debug)]
pub struct General(pub f64);

impl ToScpi for General {
    fn to_scpi(&self) -> String {
        let value = self.0;

        if value == 0.0 {
            return String::from("0");
        }

        // Let the scientific formatter decide the rounded exponent
        let sci = format!("{:.5e}", value);
        let (mantissa, exp) = match sci.split_once('e') {
            Some(parts) => parts,
            None => return sci
        };
        let exponent: i32 = exp.parse().unwrap_or(0);

        if exponent < -4 || exponent >= 6 {
            format!("{}e{}", trim_zeros(mantissa), pad_exponent(exp))
        } else {
            let decimals = (5 - exponent) as usize;
            trim_zeros(&format!("{:.*}", decimals, value)).to_string()
        }
    }
}


/// Join a list of values in `%g` notation
pub fn general_list(values: &[f64]) -> String {
    let items: Vec<String> = values.iter().map(|v| General(*v).to_scpi()).collect();
    items.join(",")
}


fn trim_zeros(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

// `-6` → `-06`, `5` → `+05`
fn pad_exponent(exp: &str) -> String {
    let (sign, digits) = match exp.strip_prefix('-') {
        Some(d) => ('-', d),
        None => ('+', exp.trim_start_matches('+'))
    };

    if digits.len() < 2 {
        format!("{}0{}", sign, digits)
    } else {
        format!("{}{}", sign, digits)
    }
}


#[cfg(test)]
mod tests {

    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn fixed_volts() {
        assert_eq!(FixedVolts(0.0).to_scpi(), "0.0");
        assert_eq!(FixedVolts(-0.0).to_scpi(), "0.0");
        assert_eq!(FixedVolts(5.0).to_scpi(), "5.0");
        assert_eq!(FixedVolts(0.1 + 0.2).to_scpi(), "0.3");
        assert_eq!(FixedVolts(0.3 + 0.005).to_scpi(), "0.305");
        assert_eq!(FixedVolts(0.6969300000000001).to_scpi(), "0.69693");
        assert_eq!(FixedVolts(-1.25).to_scpi(), "-1.25");
        assert_eq!(FixedVolts(1e-6).to_scpi(), "1e-06");
    }

    #[test]
    fn general() {
        assert_eq!(General(0.0).to_scpi(), "0");
        assert_eq!(General(2e-6).to_scpi(), "2e-06");
        assert_eq!(General(1e-6).to_scpi(), "1e-06");
        assert_eq!(General(-0.2).to_scpi(), "-0.2");
        assert_eq!(General(0.15).to_scpi(), "0.15");
        assert_eq!(General(-0.4875).to_scpi(), "-0.4875");
        assert_eq!(General(0.099625).to_scpi(), "0.099625");
        assert_eq!(General(-0.48821000000000003).to_scpi(), "-0.48821");
        assert_eq!(General(0.0739763112).to_scpi(), "0.0739763");
        assert_eq!(General(1.0).to_scpi(), "1");
        assert_eq!(General(1234567.0).to_scpi(), "1.23457e+06");
        assert_eq!(General(0.0001).to_scpi(), "0.0001");
        assert_eq!(General(0.00001).to_scpi(), "1e-05");
    }

    #[test]
    fn lists() {
        assert_eq!(general_list(&[-0.3, -0.15, 0.0, 0.15, 0.3]), "-0.3,-0.15,0,0.15,0.3");
        assert_eq!(ChannelList::new(&[1, 2, 3]).to_scpi(), "(@1,2,3)");
        assert_eq!(ChannelList::new(&[7]).to_scpi(), "(@7)");
    }

    #[test]
    fn triggers() {
        assert_eq!(InternalTrigger::new(3).to_scpi(), "int3");
        assert_eq!(OutputTrigger::from_number(4).unwrap(), OutputTrigger::Out4);
        assert_matches!(OutputTrigger::from_number(0),
            Err(Qdac2Error::InvalidOutputTrigger(0)));
        assert_matches!(OutputTrigger::from_number(6),
            Err(Qdac2Error::InvalidOutputTrigger(6)));
    }

    #[test]
    fn channels() {
        assert_matches!(check_channel(1), Ok(1));
        assert_matches!(check_channel(24), Ok(24));
        assert_matches!(check_channel(0), Err(Qdac2Error::InvalidChannel(0)));
        assert_matches!(check_channel(25), Err(Qdac2Error::InvalidChannel(25)));
    }

    #[test]
    fn voltages() {
        assert_matches!(check_voltage(-1.5), Ok(v) if v == -1.5);
        assert_matches!(check_voltage(f64::NAN), Err(Qdac2Error::InvalidVoltage(v)) if v.is_nan());
        assert_matches!(check_voltage(f64::INFINITY), Err(Qdac2Error::InvalidVoltage(_)));
        assert_matches!(check_voltage(f64::NEG_INFINITY), Err(Qdac2Error::InvalidVoltage(_)));
    }
}
