//! The trace line format.
//!
//! Every line starts with a twelve digit microsecond timestamp followed by a marker: `>` for a
//! request sent to the device, `<` for its result and `#` for commentary. Requests and results
//! carry an operation keyword and `key:value` parameters; a token starting with `#` ends the
//! parsed part of a line, so fixes can be tagged in place:
//!
//! ```text
//! 000000000000 # DEVICE_NAME=wheel, ...
//! 000000000210 #> UPLOAD id:-1 dir:0 length:0 delay:0 type:CONSTANT level:1000 ...
//! 000000000231 > UPLOAD id:-1 dir:49152 length:0 delay:0 type:CONSTANT level:1000 ... # direction fix
//! 000000000650 < 0 id:0
//! 000000000900 > PLAY 0 1
//! 000000000921 < 24
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::ff::{FFCondition, FFEffectDescriptor, FFEffectKind, FFEnvelope, FFWaveform};
use crate::FFEffectCode;

/// One parsed trace line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Microseconds since the first line of the session.
    pub timestamp: u64,
    pub entry: Entry,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entry {
    /// `>`: an operation forwarded to the device.
    Request(Request),
    /// `<`: the status the caller saw.
    Response(Response),
    /// `#`: everything after the hash, verbatim. Also covers annotated `#>` and `#<` lines.
    Comment(String),
}

/// A device operation as it appears after the `>` marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// Capability bitmap query.
    Query,
    /// Effect memory size query.
    Slots,
    Remove(i32),
    Upload(FFEffectDescriptor),
    Gain(i32),
    Autocenter(i32),
    Play { id: u16, count: i32 },
    Stop(u16),
}

/// The result of the preceding request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Response {
    /// `0` or a negated errno for ioctls, the byte count for writes.
    pub status: i64,
    /// Effect id after an upload.
    pub id: Option<i16>,
    /// Effect memory size after a slots query.
    pub effects: Option<i32>,
    /// Supported codes after a capability query.
    pub features: Option<Vec<FFEffectCode>>,
}

impl Response {
    pub fn with_status(status: i64) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:012} {}", self.timestamp, self.entry)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Entry::Request(request) => write!(f, "> {}", request),
            Entry::Response(response) => write!(f, "< {}", response),
            Entry::Comment(text) => write!(f, "#{}", text),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Request::Query => f.write_str("QUERY"),
            Request::Slots => f.write_str("SLOTS"),
            Request::Remove(id) => write!(f, "REMOVE {}", id),
            Request::Upload(effect) => write!(f, "UPLOAD {}", Upload(effect)),
            Request::Gain(value) => write!(f, "GAIN {}", value),
            Request::Autocenter(value) => write!(f, "AUTOCENTER {}", value),
            Request::Play { id, count } => write!(f, "PLAY {} {}", id, count),
            Request::Stop(id) => write!(f, "STOP {}", id),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.status)?;
        if let Some(id) = self.id {
            write!(f, " id:{}", id)?;
        }
        if let Some(effects) = self.effects {
            write!(f, " effects:{}", effects)?;
        }
        if let Some(features) = &self.features {
            f.write_str(" features:")?;
            for (i, code) in features.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{:?}", code)?;
            }
        }
        Ok(())
    }
}

/// The parameter list of an `UPLOAD` line.
struct Upload<'a>(&'a FFEffectDescriptor);

impl fmt::Display for Upload<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let effect = self.0;
        write!(
            f,
            "id:{} dir:{} length:{} delay:{} type:{}",
            effect.id,
            effect.direction,
            effect.replay.length,
            effect.replay.delay,
            effect.kind.type_name()
        )?;

        match &effect.kind {
            FFEffectKind::Constant { level, envelope: e } => {
                write!(f, " level:{}", level)?;
                write_envelope(f, e)?;
            }
            FFEffectKind::Ramp {
                start_level,
                end_level,
                envelope: e,
            } => {
                write!(f, " start_level:{} end_level:{}", start_level, end_level)?;
                write_envelope(f, e)?;
            }
            FFEffectKind::Periodic {
                waveform,
                period,
                magnitude,
                offset,
                phase,
                envelope: e,
            } => {
                write!(
                    f,
                    " waveform:{} period:{} magnitude:{} offset:{} phase:{}",
                    waveform.name(),
                    period,
                    magnitude,
                    offset,
                    phase
                )?;
                write_envelope(f, e)?;
            }
            FFEffectKind::Spring { condition }
            | FFEffectKind::Friction { condition }
            | FFEffectKind::Damper { condition }
            | FFEffectKind::Inertia { condition } => {
                for (prefix, c) in ["", "y_"].iter().zip(condition) {
                    write!(
                        f,
                        " {p}right_saturation:{} {p}left_saturation:{} {p}right_coeff:{} \
                         {p}left_coeff:{} {p}deadband:{} {p}center:{}",
                        c.right_saturation,
                        c.left_saturation,
                        c.right_coefficient,
                        c.left_coefficient,
                        c.deadband,
                        c.center,
                        p = prefix,
                    )?;
                }
            }
            FFEffectKind::Rumble {
                strong_magnitude,
                weak_magnitude,
            } => {
                write!(f, " strong:{} weak:{}", strong_magnitude, weak_magnitude)?;
            }
        }

        write!(
            f,
            " button:{} interval:{}",
            effect.trigger.button, effect.trigger.interval
        )
    }
}

fn write_envelope(f: &mut fmt::Formatter, e: &FFEnvelope) -> fmt::Result {
    write!(
        f,
        " attack_length:{} attack_level:{} fade_length:{} fade_level:{}",
        e.attack_length, e.attack_level, e.fade_length, e.fade_level
    )
}

impl FromStr for Record {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\n', '\r']);
        let line = line.trim_start();
        let (stamp, rest) = line
            .split_once(char::is_whitespace)
            .unwrap_or((line, ""));
        if stamp.is_empty() {
            return Err(ParseError::MissingTimestamp);
        }
        if !stamp.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::BadTimestamp(stamp.to_owned()));
        }
        let timestamp = stamp
            .parse()
            .map_err(|_| ParseError::BadTimestamp(stamp.to_owned()))?;

        let rest = rest.trim_start();
        if let Some(text) = rest.strip_prefix('#') {
            return Ok(Record {
                timestamp,
                entry: Entry::Comment(text.to_owned()),
            });
        }

        let mut tokens = rest.split_whitespace().take_while(|t| !t.starts_with('#'));
        let entry = match tokens.next() {
            Some(">") => Entry::Request(parse_request(&mut tokens)?),
            Some("<") => Entry::Response(parse_response(&mut tokens)?),
            Some(marker) => return Err(ParseError::UnknownMarker(marker.to_owned())),
            None => return Err(ParseError::MissingMarker),
        };

        Ok(Record { timestamp, entry })
    }
}

impl FromStr for Request {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_request(&mut s.split_whitespace().take_while(|t| !t.starts_with('#')))
    }
}

fn parse_request<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Result<Request, ParseError> {
    let keyword = tokens.next().ok_or(ParseError::MissingKeyword)?;

    let request = match keyword {
        "QUERY" => Request::Query,
        "SLOTS" => Request::Slots,
        "REMOVE" => Request::Remove(argument(tokens, "id")?),
        "GAIN" => Request::Gain(argument(tokens, "gain")?),
        "AUTOCENTER" => Request::Autocenter(argument(tokens, "autocenter")?),
        "PLAY" => {
            let id = argument(tokens, "id")?;
            let count = argument(tokens, "count")?;
            Request::Play { id, count }
        }
        "STOP" => Request::Stop(argument(tokens, "id")?),
        "UPLOAD" => Request::Upload(parse_upload(tokens)?),
        other => return Err(ParseError::UnknownKeyword(other.to_owned())),
    };
    Ok(request)
}

/// The next positional argument, as a number.
fn argument<'a, T: TryFrom<i64>>(
    tokens: &mut impl Iterator<Item = &'a str>,
    name: &'static str,
) -> Result<T, ParseError> {
    let text = tokens.next().ok_or(ParseError::MissingArgument(name))?;
    number(name, text)
}

fn parse_response<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Result<Response, ParseError> {
    let status = tokens.next().ok_or(ParseError::MissingArgument("status"))?;
    let mut response = Response::with_status(number("status", status.trim_end_matches(','))?);

    while let Some(token) = tokens.next() {
        let Some((key, value)) = token.split_once(':') else {
            continue;
        };
        // `effects: 16` keeps the value in its own token.
        let value = match value.trim_end_matches(',') {
            "" => tokens.next().unwrap_or_default().trim_end_matches(','),
            value => value,
        };
        match key {
            "id" => response.id = Some(number(key, value)?),
            "effects" => response.effects = Some(number(key, value)?),
            "features" => {
                let features: Vec<FFEffectCode> = value
                    .split(',')
                    .filter(|name| !name.is_empty())
                    .map(|name| {
                        name.parse()
                            .map_err(|_| ParseError::UnknownFeature(name.to_owned()))
                    })
                    .collect::<Result<_, _>>()?;
                response.features = Some(features);
            }
            _ => {}
        }
    }
    Ok(response)
}

/// Rebuilds an effect from `key:value` tokens.
///
/// Keys absent from the line keep the defaults of [`FFEffectKind::initial`]; keys that don't
/// belong to the effect's type are ignored.
fn parse_upload<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
) -> Result<FFEffectDescriptor, ParseError> {
    let params = tokens
        .map(|token| {
            token
                .split_once(':')
                .map(|(key, value)| (key, value.trim_end_matches(',')))
                .ok_or_else(|| ParseError::BadParameter(token.to_owned()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let type_name = params
        .iter()
        .find(|(key, _)| *key == "type")
        .map(|(_, value)| *value)
        .ok_or(ParseError::MissingArgument("type"))?;
    let kind = FFEffectKind::initial(type_name)
        .ok_or_else(|| ParseError::UnknownEffectType(type_name.to_owned()))?;
    let mut effect = FFEffectDescriptor::new(kind);

    for (key, value) in params {
        match key {
            "id" => effect.id = number(key, value)?,
            "dir" => effect.direction = number(key, value)?,
            "length" => effect.replay.length = number(key, value)?,
            "delay" => effect.replay.delay = number(key, value)?,
            "button" => effect.trigger.button = number(key, value)?,
            "interval" => effect.trigger.interval = number(key, value)?,
            "type" => {}
            _ => apply_param(&mut effect.kind, key, value)?,
        }
    }
    Ok(effect)
}

fn apply_param(kind: &mut FFEffectKind, key: &str, value: &str) -> Result<(), ParseError> {
    match kind {
        FFEffectKind::Constant { level, envelope } => match key {
            "level" => *level = number(key, value)?,
            _ => envelope_param(envelope, key, value)?,
        },
        FFEffectKind::Ramp {
            start_level,
            end_level,
            envelope,
        } => match key {
            "start_level" => *start_level = number(key, value)?,
            "end_level" => *end_level = number(key, value)?,
            _ => envelope_param(envelope, key, value)?,
        },
        FFEffectKind::Periodic {
            waveform,
            period,
            magnitude,
            offset,
            phase,
            envelope,
        } => match key {
            "waveform" => {
                *waveform = FFWaveform::from_name(value)
                    .ok_or_else(|| ParseError::UnknownWaveform(value.to_owned()))?
            }
            "period" => *period = number(key, value)?,
            "magnitude" => *magnitude = number(key, value)?,
            "offset" => *offset = number(key, value)?,
            "phase" => *phase = number(key, value)?,
            _ => envelope_param(envelope, key, value)?,
        },
        FFEffectKind::Rumble {
            strong_magnitude,
            weak_magnitude,
        } => match key {
            "strong" | "strong_rumble" => *strong_magnitude = number(key, value)?,
            "weak" | "weak_rumble" => *weak_magnitude = number(key, value)?,
            _ => {}
        },
        FFEffectKind::Spring { condition }
        | FFEffectKind::Friction { condition }
        | FFEffectKind::Damper { condition }
        | FFEffectKind::Inertia { condition } => {
            let (axis, field) = match key.strip_prefix("y_") {
                Some(field) => (&mut condition[1], field),
                None => (&mut condition[0], key),
            };
            condition_param(axis, field, key, value)?;
        }
    }
    Ok(())
}

fn envelope_param(envelope: &mut FFEnvelope, key: &str, value: &str) -> Result<(), ParseError> {
    match key {
        "attack_length" => envelope.attack_length = number(key, value)?,
        "attack_level" => envelope.attack_level = number(key, value)?,
        "fade_length" => envelope.fade_length = number(key, value)?,
        "fade_level" => envelope.fade_level = number(key, value)?,
        _ => {}
    }
    Ok(())
}

fn condition_param(
    axis: &mut FFCondition,
    field: &str,
    key: &str,
    value: &str,
) -> Result<(), ParseError> {
    match field {
        "right_saturation" => axis.right_saturation = number(key, value)?,
        "left_saturation" => axis.left_saturation = number(key, value)?,
        "right_coeff" => axis.right_coefficient = number(key, value)?,
        "left_coeff" => axis.left_coefficient = number(key, value)?,
        "deadband" => axis.deadband = number(key, value)?,
        "center" => axis.center = number(key, value)?,
        _ => {}
    }
    Ok(())
}

/// Parses a whole token as a decimal or `0x` hexadecimal integer that fits `T`.
fn number<T: TryFrom<i64>>(key: &str, text: &str) -> Result<T, ParseError> {
    let bad = || ParseError::BadNumber {
        key: key.to_owned(),
        value: text.to_owned(),
    };

    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (radix, body) = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => (16, hex),
        None => (10, digits),
    };
    if body.starts_with(['+', '-']) {
        return Err(bad());
    }
    let magnitude = i64::from_str_radix(body, radix).map_err(|_| bad())?;

    let value = if negative { -magnitude } else { magnitude };
    T::try_from(value).map_err(|_| bad())
}
