use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Initial progress of a FOLLOW_UP so it trails its SYNC on screen.
pub const FOLLOW_UP_STAGGER: f64 = -0.05;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PacketType {
    Sync,
    FollowUp,
    DelayReq,
    DelayResp,
}

impl PacketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PacketType::Sync => "SYNC",
            PacketType::FollowUp => "FOLLOW_UP",
            PacketType::DelayReq => "DELAY_REQ",
            PacketType::DelayResp => "DELAY_RESP",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol timestamps carried by each message kind.
///
/// - `t1`: master clock when SYNC left
/// - `t2`: slave clock when SYNC arrived (approximated, see [`crate::protocol`])
/// - `t3`: slave clock when DELAY_REQ left
/// - `t4`: master clock when DELAY_REQ arrived
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Payload {
    Sync,
    FollowUp { t1: f64 },
    DelayReq { t1: f64, t2: f64 },
    DelayResp { t1: f64, t2: f64, t3: f64, t4: f64 },
}

impl Payload {
    pub fn kind(&self) -> PacketType {
        match self {
            Payload::Sync => PacketType::Sync,
            Payload::FollowUp { .. } => PacketType::FollowUp,
            Payload::DelayReq { .. } => PacketType::DelayReq,
            Payload::DelayResp { .. } => PacketType::DelayResp,
        }
    }

    /// Textbook path estimate, available once all four timestamps are known.
    pub fn path_estimate(&self) -> Option<PathEstimate> {
        match *self {
            Payload::DelayResp { t1, t2, t3, t4 } => {
                Some(PathEstimate::from_timestamps(t1, t2, t3, t4))
            }
            _ => None,
        }
    }
}

/// One protocol message in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub id: Uuid,
    pub from_id: String,
    pub to_id: String,
    /// Sender clock reading at send time.
    pub timestamp: f64,
    /// Fraction of the hop covered. Negative means not yet departed.
    pub progress: f64,
    pub payload: Payload,
}

impl Packet {
    pub fn new(from_id: &str, to_id: &str, timestamp: f64, payload: Payload) -> Self {
        Packet {
            id: Uuid::new_v4(),
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            timestamp,
            progress: 0.0,
            payload,
        }
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = progress;
        self
    }

    pub fn kind(&self) -> PacketType {
        self.payload.kind()
    }

    pub fn has_arrived(&self) -> bool {
        self.progress >= 1.0
    }
}

/// Mean path delay and offset from the classic two-step formula.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathEstimate {
    pub mean_path_delay: f64,
    pub offset: f64,
}

impl PathEstimate {
    pub fn from_timestamps(t1: f64, t2: f64, t3: f64, t4: f64) -> Self {
        let mean_path_delay = ((t2 - t1) + (t4 - t3)) / 2.0;
        PathEstimate {
            mean_path_delay,
            offset: (t2 - t1) - mean_path_delay,
        }
    }
}
