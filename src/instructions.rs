//! Commands processable by QDAC-II

use crate::params::{ToScpi, InternalTrigger, OutputTrigger, CurrentRange};
use crate::params::{ChannelList, FixedVolts, General};
use crate::params::general_list;

macro_rules! make_vec_instr_impl {
    ($t:ident, $f:ident) => {

        fn create() -> $t {
            $t { $f: Vec::with_capacity(Self::LENGTH) }
        }

        fn push_line(&mut self, line: String) {
            self.$f.push(line);
        }

        fn view(&self) -> &[String] {
            &self.$f
        }
    }
}


/// Common behaviour of all available instructions.
///
/// An instruction is an ordered group of SCPI lines that belong together
/// and must be written in sequence, for instance switching a channel to
/// fixed mode and then setting its voltage. Instructions implement
/// `create`, `push_line` and `view`; everything else is derived from these.
/// They are written to the instrument with
/// [`process`][`crate::Qdac2::process()`].
pub trait Instruction {

    #[doc(hidden)]
    const LENGTH: usize = 2;

    /// Create a new empty instruction
    fn create() -> Self where Self: Sized;

    /// Append a SCPI line to the instruction
    fn push_line(&mut self, line: String);

    /// View the SCPI lines of this instruction
    fn view(&self) -> &[String];

    /// Number of SCPI lines
    fn len(&self) -> usize {
        self.view().len()
    }

    #[doc(hidden)]
    /// Create a new instruction from a bunch of lines
    fn from_lines(lines: Vec<String>) -> Self where Self: Sized {
        let mut instr = Self::create();
        for line in lines {
            instr.push_line(line);
        }
        instr
    }
}


/// Set a channel to a constant voltage, effective immediately
///
/// ## Lines
///
/// ```text
/// sour<ch>:volt:mode fix
/// sour<ch>:volt <V>
/// ```
pub struct SetFixedVoltage {
    lines: Vec<String>
}

impl SetFixedVoltage {

    /// Create a new instruction
    pub fn new(channel: u8, volts: f64) -> Self {
        Self::from_lines(vec![
            format!("sour{}:volt:mode fix", channel),
            format!("sour{}:volt {}", channel, FixedVolts(volts).to_scpi()),
        ])
    }
}

impl Instruction for SetFixedVoltage { make_vec_instr_impl!(SetFixedVoltage, lines); }


/// Program a channel with a voltage list and arm it on an internal trigger
///
/// The channel is held while the list is uploaded, then initiated twice:
/// once on the bus trigger, which primes the list, and once on the start
/// trigger, so that every channel of a sweep is waiting on the same
/// internal trigger before any of them fires.
///
/// ## Lines
///
/// ```text
/// sour<ch>:dc:trig:sour hold
/// sour<ch>:volt:mode list
/// sour<ch>:list:volt <V,V,...>
/// sour<ch>:list:tmod auto
/// sour<ch>:list:dwel <s>
/// sour<ch>:list:dir up
/// sour<ch>:list:coun <n>
/// sour<ch>:dc:trig:sour bus
/// sour<ch>:dc:init:cont on
/// sour<ch>:dc:init
/// sour<ch>:dc:trig:sour int<t>
/// sour<ch>:dc:init:cont on
/// sour<ch>:dc:init
/// ```
pub struct ListProgram {
    lines: Vec<String>
}

impl ListProgram {

    /// Number of lines emitted per channel
    pub const LINES: usize = 13;

    /// Create a new instruction
    pub fn new(channel: u8, voltages: &[f64], dwell_s: f64, repetitions: u32,
        start: InternalTrigger) -> Self {

        let prefix = format!("sour{}", channel);

        let mut instr = Self::create();
        instr.push_line(format!("{}:dc:trig:sour hold", prefix));
        instr.push_line(format!("{}:volt:mode list", prefix));
        instr.push_line(format!("{}:list:volt {}", prefix, general_list(voltages)));
        instr.push_line(format!("{}:list:tmod auto", prefix));
        instr.push_line(format!("{}:list:dwel {}", prefix, General(dwell_s).to_scpi()));
        instr.push_line(format!("{}:list:dir up", prefix));
        instr.push_line(format!("{}:list:coun {}", prefix, repetitions));
        instr.push_line(format!("{}:dc:trig:sour bus", prefix));
        instr.push_line(format!("{}:dc:init:cont on", prefix));
        instr.push_line(format!("{}:dc:init", prefix));
        instr.push_line(format!("{}:dc:trig:sour {}", prefix, start.to_scpi()));
        instr.push_line(format!("{}:dc:init:cont on", prefix));
        instr.push_line(format!("{}:dc:init", prefix));

        instr
    }
}

impl Instruction for ListProgram { make_vec_instr_impl!(ListProgram, lines); }


/// Route an internal trigger to an external trigger output
///
/// ## Lines
///
/// ```text
/// outp:trig<o>:sour int<t>
/// outp:trig<o>:widt <s>
/// ```
pub struct RouteOutputTrigger {
    lines: Vec<String>
}

impl RouteOutputTrigger {

    /// Create a new instruction
    pub fn new(output: OutputTrigger, source: InternalTrigger, width_s: f64) -> Self {
        Self::from_lines(vec![
            format!("outp:trig{}:sour {}", output.value(), source.to_scpi()),
            format!("outp:trig{}:widt {}", output.value(), General(width_s).to_scpi()),
        ])
    }
}

impl Instruction for RouteOutputTrigger { make_vec_instr_impl!(RouteOutputTrigger, lines); }


/// Fire an internal trigger at the start of every list step of a channel
///
/// ## Lines
///
/// ```text
/// sour<ch>:dc:mark:sst <t>
/// ```
pub struct StepMarker {
    lines: Vec<String>
}

impl StepMarker {

    /// Create a new instruction
    pub fn new(channel: u8, trigger: InternalTrigger) -> Self {
        Self::from_lines(vec![
            format!("sour{}:dc:mark:sst {}", channel, trigger.value())
        ])
    }
}

impl Instruction for StepMarker { make_vec_instr_impl!(StepMarker, lines); }


/// Fire an internal trigger immediately
///
/// ## Lines
///
/// ```text
/// tint <t>
/// ```
pub struct FireTrigger {
    lines: Vec<String>
}

impl FireTrigger {

    /// Create a new instruction
    pub fn new(trigger: InternalTrigger) -> Self {
        Self::from_lines(vec![format!("tint {}", trigger.value())])
    }
}

impl Instruction for FireTrigger { make_vec_instr_impl!(FireTrigger, lines); }


/// Configure current measurement range and integration time
///
/// ## Lines
///
/// ```text
/// sens:rang <range>,(@<channels>)
/// sens:nplc <n>,(@<channels>)
/// ```
pub struct SenseSetup {
    lines: Vec<String>
}

impl SenseSetup {

    /// Create a new instruction
    pub fn new(channels: &ChannelList, range: CurrentRange, nplc: u32) -> Self {
        let suffix = channels.to_scpi();
        Self::from_lines(vec![
            format!("sens:rang {},{}", range.to_scpi(), suffix),
            format!("sens:nplc {},{}", nplc, suffix),
        ])
    }
}

impl Instruction for SenseSetup { make_vec_instr_impl!(SenseSetup, lines); }


/// Reset the instrument to its power-on state
///
/// ## Lines
///
/// ```text
/// *rst
/// ```
pub struct Reset {
    lines: Vec<String>
}

impl Reset {

    /// Create a new instruction
    pub fn new() -> Self {
        Self::from_lines(vec![String::from("*rst")])
    }
}

impl Instruction for Reset { make_vec_instr_impl!(Reset, lines); }
