use std::fmt;
use std::str::FromStr;

use crate::config::DisturbanceParams;
use crate::core::{NodeId, Telemetry};

/// Terminator appended to every frame
pub const LINE_TERMINATOR: &str = "\r\n";

/// One line of the microcontroller serial protocol
#[derive(Debug, Clone, PartialEq)]
pub enum SerialFrame {
    /// `n<enabled>,<node>,<neighbor>,...`
    Network {
        enabled: bool,
        node: NodeId,
        neighbors: Vec<NodeId>,
    },
    /// `a<clock>,<dt>,<state>,<vstate>,<vartheta>,<eta>`
    Consensus {
        clock: u32,
        dt: u32,
        state: i32,
        vstate: i32,
        vartheta: i32,
        eta: i32,
    },
    /// `p<on>,<amplitude>,<offset>,<beta>,<Amp>,<frequency>,<phase>,<samples>`
    Disturbance(DisturbanceParams),
    /// `t<trigger>`
    Trigger(bool),
    /// `d<timestamp>,<state>,<vstate>,<vartheta>,<neighbor vstates>...`, inbound only
    Data(Telemetry),
}

impl SerialFrame {
    /// Message tag character
    pub fn tag(&self) -> char {
        match self {
            SerialFrame::Network { .. } => 'n',
            SerialFrame::Consensus { .. } => 'a',
            SerialFrame::Disturbance(_) => 'p',
            SerialFrame::Trigger(_) => 't',
            SerialFrame::Data(_) => 'd',
        }
    }

    /// Frame text including the line terminator
    pub fn to_line(&self) -> String {
        format!("{}{}", self, LINE_TERMINATOR)
    }

    /// Parses one line without its terminator
    ///
    /// Returns `None` for unknown tags and malformed fields.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
        let mut chars = line.chars();
        let tag = chars.next()?;
        let fields: Vec<&str> = chars.as_str().split(',').filter(|f| !f.is_empty()).collect();

        match tag {
            'n' => {
                let (head, rest) = split_head::<2>(&fields)?;
                Some(SerialFrame::Network {
                    enabled: parse_flag(head[0])?,
                    node: NodeId(head[1].parse().ok()?),
                    neighbors: rest
                        .iter()
                        .map(|f| f.parse().ok().map(NodeId))
                        .collect::<Option<Vec<_>>>()?,
                })
            }
            'a' => {
                let [clock, dt, state, vstate, vartheta, eta] = exact::<6>(&fields)?;
                Some(SerialFrame::Consensus {
                    clock: num(clock)?,
                    dt: num(dt)?,
                    state: num(state)?,
                    vstate: num(vstate)?,
                    vartheta: num(vartheta)?,
                    eta: num(eta)?,
                })
            }
            'p' => {
                let [on, amplitude, offset, beta, amp, frequency, phase, samples] = exact::<8>(&fields)?;
                Some(SerialFrame::Disturbance(DisturbanceParams {
                    disturbance_on: parse_flag(on)?,
                    random: false,
                    amplitude: num(amplitude)?,
                    offset: num(offset)?,
                    beta: num(beta)?,
                    amp: num(amp)?,
                    frequency: num(frequency)?,
                    phase: num(phase)?,
                    samples: num(samples)?,
                }))
            }
            't' => {
                let [trigger] = exact::<1>(&fields)?;
                Some(SerialFrame::Trigger(parse_flag(trigger)?))
            }
            'd' => {
                let (head, rest) = split_head::<4>(&fields)?;
                Some(SerialFrame::Data(Telemetry {
                    timestamp: num(head[0])?,
                    state: num(head[1])?,
                    vstate: num(head[2])?,
                    vartheta: num(head[3])?,
                    neighbor_vstates: rest.iter().map(|f| num(f)).collect::<Option<Vec<_>>>()?,
                }))
            }
            _ => None,
        }
    }
}

impl fmt::Display for SerialFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())?;
        match self {
            SerialFrame::Network { enabled, node, neighbors } => {
                write!(f, "{},{}", flag(*enabled), node)?;
                for neighbor in neighbors {
                    write!(f, ",{}", neighbor)?;
                }
                Ok(())
            }
            SerialFrame::Consensus { clock, dt, state, vstate, vartheta, eta } => {
                write!(f, "{},{},{},{},{},{}", clock, dt, state, vstate, vartheta, eta)
            }
            SerialFrame::Disturbance(p) => write!(
                f,
                "{},{},{},{},{},{},{},{}",
                flag(p.disturbance_on),
                p.amplitude,
                p.offset,
                p.beta,
                p.amp,
                p.frequency,
                p.phase,
                p.samples
            ),
            SerialFrame::Trigger(trigger) => write!(f, "{}", flag(*trigger)),
            SerialFrame::Data(t) => {
                write!(f, "{},{},{},{}", t.timestamp, t.state, t.vstate, t.vartheta)?;
                for v in &t.neighbor_vstates {
                    write!(f, ",{}", v)?;
                }
                Ok(())
            }
        }
    }
}

fn flag(value: bool) -> u8 {
    if value { 1 } else { 0 }
}

fn parse_flag(field: &str) -> Option<bool> {
    match field.trim() {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

fn num<T: FromStr>(field: &str) -> Option<T> {
    field.trim().parse().ok()
}

fn exact<'a, const N: usize>(fields: &[&'a str]) -> Option<[&'a str; N]> {
    fields.try_into().ok()
}

fn split_head<'a, 'b, const N: usize>(fields: &'b [&'a str]) -> Option<([&'a str; N], &'b [&'a str])> {
    if fields.len() < N {
        return None;
    }
    let (head, rest) = fields.split_at(N);
    Some((head.try_into().ok()?, rest))
}
