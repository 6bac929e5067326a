//! data.rs
//! Shared value types that flow through the event pipeline: barrier and NFC
//! events from the producers, fused events delivered to FSMs, and the
//! synthetic timer events that feed deferred FSM transitions back into the
//! fuser's dispatch loop.

use std::time::Instant;

/// Frozen symbolic barrier identifiers. These map 1:1 onto the physical and
/// expander-side light gates / limit switches described in the sensor
/// producer design; they never change shape at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarrierId {
    S1Entry,
    S1Process,
    S1Exit,
    S2Entry,
    S2Process,
    S2Exit,
    C1Pos,
    C2Pos,
    C3Pos,
    C4Pos,
    Corner1Ext,
    Corner2Ext,
    Corner3Ext,
    Corner4Ext,
    Corner1Ret,
    Corner2Ret,
    Corner3Ret,
    Corner4Ret,
    M1Start,
    M2Start,
}

impl BarrierId {
    pub fn name(&self) -> &'static str {
        match self {
            BarrierId::S1Entry => "S1_ENTRY",
            BarrierId::S1Process => "S1_PROCESS",
            BarrierId::S1Exit => "S1_EXIT",
            BarrierId::S2Entry => "S2_ENTRY",
            BarrierId::S2Process => "S2_PROCESS",
            BarrierId::S2Exit => "S2_EXIT",
            BarrierId::C1Pos => "C1_POS",
            BarrierId::C2Pos => "C2_POS",
            BarrierId::C3Pos => "C3_POS",
            BarrierId::C4Pos => "C4_POS",
            BarrierId::Corner1Ext => "CORNER1_EXT",
            BarrierId::Corner2Ext => "CORNER2_EXT",
            BarrierId::Corner3Ext => "CORNER3_EXT",
            BarrierId::Corner4Ext => "CORNER4_EXT",
            BarrierId::Corner1Ret => "CORNER1_RET",
            BarrierId::Corner2Ret => "CORNER2_RET",
            BarrierId::Corner3Ret => "CORNER3_RET",
            BarrierId::Corner4Ret => "CORNER4_RET",
            BarrierId::M1Start => "M1_START",
            BarrierId::M2Start => "M2_START",
        }
    }

    /// Station/corner/conveyor this barrier belongs to.
    pub fn location(&self) -> Location {
        match self {
            BarrierId::S1Entry | BarrierId::S1Process | BarrierId::S1Exit => {
                Location::station(1)
            }
            BarrierId::S2Entry | BarrierId::S2Process | BarrierId::S2Exit => {
                Location::station(2)
            }
            BarrierId::C1Pos | BarrierId::Corner1Ext | BarrierId::Corner1Ret => {
                Location::corner(1)
            }
            BarrierId::C2Pos | BarrierId::Corner2Ext | BarrierId::Corner2Ret => {
                Location::corner(2)
            }
            BarrierId::C3Pos | BarrierId::Corner3Ext | BarrierId::Corner3Ret => {
                Location::corner(3)
            }
            BarrierId::C4Pos | BarrierId::Corner4Ext | BarrierId::Corner4Ret => {
                Location::corner(4)
            }
            BarrierId::M1Start => Location::conveyor(1),
            BarrierId::M2Start => Location::conveyor(2),
        }
    }

    /// Entry barriers are the only ones that participate in NFC fusion.
    pub fn is_entry(&self) -> bool {
        matches!(self, BarrierId::S1Entry | BarrierId::S2Entry)
    }

    /// Corner whose push handshake this barrier confirms, for barriers
    /// mounted on the conveyor rather than on the corner itself. M1_START
    /// confirms corner 2's push, M2_START confirms corner 4's.
    pub fn confirmation_corner(&self) -> Option<u8> {
        match self {
            BarrierId::M1Start => Some(2),
            BarrierId::M2Start => Some(4),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationKind {
    Station,
    Corner,
    Conveyor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub kind: LocationKind,
    pub index: u8,
}

impl Location {
    pub fn station(index: u8) -> Self {
        Location { kind: LocationKind::Station, index }
    }
    pub fn corner(index: u8) -> Self {
        Location { kind: LocationKind::Corner, index }
    }
    pub fn conveyor(index: u8) -> Self {
        Location { kind: LocationKind::Conveyor, index }
    }
}

/// Which physical mechanism produced a barrier event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeSource {
    Interrupt,
    Polled,
}

#[derive(Debug, Clone)]
pub struct BarrierEvent {
    pub timestamp: Instant,
    pub barrier_id: BarrierId,
    pub location: Location,
    pub source: EdgeSource,
}

/// Opaque NFC tag identifier, hex-encoded by the reader backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagId(pub String);

impl TagId {
    pub fn short(&self) -> &str {
        if self.0.len() > 8 { &self.0[..8] } else { &self.0 }
    }
}

#[derive(Debug, Clone)]
pub struct NfcEvent {
    pub timestamp: Instant,
    pub station_index: u8,
    pub tag_id: TagId,
    pub reader_index: u8,
}

/// An event delivered to an FSM: a barrier, optionally fused with a part
/// identity. `timestamp` is always the barrier's own timestamp, never the
/// NFC read's — the NFC timestamp is only used to evaluate the fusion
/// predicate.
#[derive(Debug, Clone)]
pub struct FusedEvent {
    pub timestamp: Instant,
    pub barrier_id: BarrierId,
    pub location: Location,
    pub part_id: Option<TagId>,
}

/// Identifies which passive FSM owns a given location. Populated once at
/// startup and used thereafter only as a lookup key — FSM state itself is
/// never shared, it lives exclusively inside the fuser's dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsmKey {
    Station(u8),
    Corner(u8),
}

impl FsmKey {
    pub fn from_location(location: &Location) -> Option<FsmKey> {
        match location.kind {
            LocationKind::Station => Some(FsmKey::Station(location.index)),
            LocationKind::Corner => Some(FsmKey::Corner(location.index)),
            LocationKind::Conveyor => None,
        }
    }

    /// Resolves the FSM that owns a barrier. Most barriers resolve purely
    /// from their location; M1_START/M2_START live on the conveyor but
    /// still belong to a corner's handshake, so those fall back to
    /// `BarrierId::confirmation_corner`.
    pub fn for_barrier(barrier_id: &BarrierId, location: &Location) -> Option<FsmKey> {
        if let Some(corner) = barrier_id.confirmation_corner() {
            return Some(FsmKey::Corner(corner));
        }
        FsmKey::from_location(location)
    }
}

/// Which deferred timer fired. Reified as data so every FSM mutation,
/// whether triggered by a sensor event or by a timer, happens on the
/// fuser's single execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    StationProcessDone,
    StationExitDone,
    CornerApproachDone,
    CornerPushRetry,
    CornerPushingDone,
    CornerHandshakeTimeout,
    CornerRetractTimeout,
}

#[derive(Debug, Clone, Copy)]
pub struct TimerFired {
    pub target: FsmKey,
    pub kind: TimerKind,
}
