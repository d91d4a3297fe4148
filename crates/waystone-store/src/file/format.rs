// ABOUTME: Line format for the flat-file backend: one record per line, fields split by ';'.
// ABOUTME: Each record kind defines its file name, header comment, and line codec here.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;
use waystone_core::{CooldownRecord, InvitationRecord, LocationRecord, Record};

pub const DELIMITER: char = ';';

/// Why a persisted line could not be turned back into a record.
#[derive(Debug, Error, PartialEq)]
pub enum LineError {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: &'static str, found: usize },

    #[error("field {field} is not a number: {value:?}")]
    Number { field: &'static str, value: String },

    #[error("field {field} is not a representable timestamp: {millis}")]
    Timestamp { field: &'static str, millis: i64 },
}

/// A record kind the flat-file backend knows how to write and read back.
pub trait LineRecord: Record {
    /// File name inside the data directory.
    const FILE_NAME: &'static str;

    /// Comment lines written at the top of every snapshot.
    const HEADER: &'static [&'static str];

    fn to_line(&self) -> String;

    fn parse_line(line: &str) -> Result<Self, LineError>;
}

fn number<T: FromStr>(field: &'static str, value: &str) -> Result<T, LineError> {
    value.parse().map_err(|_| LineError::Number {
        field,
        value: value.to_string(),
    })
}

fn timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, LineError> {
    let millis: i64 = number(field, value)?;
    DateTime::from_timestamp_millis(millis).ok_or(LineError::Timestamp { field, millis })
}

impl LineRecord for LocationRecord {
    const FILE_NAME: &'static str = "homes.txt";
    const HEADER: &'static [&'static str] = &[
        "# Stores saved player locations.",
        "# <owner>;<x>;<y>;<z>;<pitch>;<yaw>;<world>[;<name>]",
    ];

    fn to_line(&self) -> String {
        format!(
            "{};{};{};{};{};{};{};{}",
            self.owner, self.x, self.y, self.z, self.pitch, self.yaw, self.world, self.name
        )
    }

    /// Accepts the current 8-field layout and the legacy 7-field one, whose
    /// location name defaults to empty.
    fn parse_line(line: &str) -> Result<Self, LineError> {
        let fields: Vec<&str> = line.split(DELIMITER).collect();
        if fields.len() != 7 && fields.len() != 8 {
            return Err(LineError::FieldCount {
                expected: "7 or 8",
                found: fields.len(),
            });
        }

        Ok(LocationRecord {
            owner: fields[0].to_string(),
            x: number("x", fields[1])?,
            y: number("y", fields[2])?,
            z: number("z", fields[3])?,
            pitch: number("pitch", fields[4])?,
            yaw: number("yaw", fields[5])?,
            world: fields[6].to_string(),
            name: fields.get(7).copied().unwrap_or_default().to_string(),
        })
    }
}

impl LineRecord for CooldownRecord {
    const FILE_NAME: &'static str = "cooldowns.txt";
    const HEADER: &'static [&'static str] = &[
        "# Stores player cooldown expiry times.",
        "# <player>;<expiry epoch millis>",
    ];

    fn to_line(&self) -> String {
        format!("{};{}", self.player, self.expiry.timestamp_millis())
    }

    fn parse_line(line: &str) -> Result<Self, LineError> {
        let fields: Vec<&str> = line.split(DELIMITER).collect();
        if fields.len() != 2 {
            return Err(LineError::FieldCount {
                expected: "2",
                found: fields.len(),
            });
        }

        Ok(CooldownRecord {
            player: fields[0].to_string(),
            expiry: timestamp("expiry", fields[1])?,
        })
    }
}

impl LineRecord for InvitationRecord {
    const FILE_NAME: &'static str = "invites.txt";
    const HEADER: &'static [&'static str] = &[
        "# Stores location invitations. An empty expiry never expires.",
        "# <source>;<home>;<target>;<expiry epoch millis>[;<reason>]",
    ];

    fn to_line(&self) -> String {
        let expires = self
            .expires
            .map(|t| t.timestamp_millis().to_string())
            .unwrap_or_default();
        let mut line = format!("{};{};{};{}", self.source, self.home, self.target, expires);
        if let Some(reason) = &self.reason {
            line.push(DELIMITER);
            line.push_str(reason);
        }
        line
    }

    /// The reason is free text and comes last, so any surplus fields are
    /// joined back into it.
    fn parse_line(line: &str) -> Result<Self, LineError> {
        let fields: Vec<&str> = line.split(DELIMITER).collect();
        if fields.len() < 4 {
            return Err(LineError::FieldCount {
                expected: "at least 4",
                found: fields.len(),
            });
        }

        let expires = match fields[3] {
            "" => None,
            millis => Some(timestamp("expiry", millis)?),
        };
        let reason = (fields.len() > 4).then(|| fields[4..].join(";"));

        Ok(InvitationRecord {
            source: fields[0].to_string(),
            home: fields[1].to_string(),
            target: fields[2].to_string(),
            expires,
            reason,
        })
    }
}
