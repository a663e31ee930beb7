//! Closed domain enums shared between the entities and the engine.
//!
//! Every status that used to be a free-form string in the persisted rows is a
//! string-valued `ActiveEnum` here, so call sites match exhaustively instead
//! of comparing strings.

use sea_orm::entity::prelude::*;
use sea_orm::sea_query::StringLen;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    #[sea_orm(string_value = "buy")]
    Buy,
    #[sea_orm(string_value = "sell")]
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    #[sea_orm(string_value = "long")]
    Long,
    #[sea_orm(string_value = "short")]
    Short,
}

impl PositionSide {
    /// +1.0 for long, -1.0 for short. Used by the exit price formulas.
    pub fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }

    /// Side of the order that opens a position in this direction.
    pub fn entry_order_side(self) -> OrderSide {
        match self {
            Self::Long => OrderSide::Buy,
            Self::Short => OrderSide::Sell,
        }
    }

    /// Side of the order that closes a position in this direction.
    pub fn exit_order_side(self) -> OrderSide {
        self.entry_order_side().opposite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "snake_case")]
pub enum Decomposition {
    #[sea_orm(string_value = "simple")]
    Simple,
    #[sea_orm(string_value = "iceberg")]
    Iceberg,
    #[sea_orm(string_value = "custom")]
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum SpotOrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "filled")]
    Filled,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// Futures strategy lifecycle state.
///
/// `waiting` is initial; `completed` and `cancelled` are terminal. All
/// transitions go through [`FuturesStatus::next`], which rejects anything
/// outside the table below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum FuturesStatus {
    #[sea_orm(string_value = "waiting")]
    Waiting,
    #[sea_orm(string_value = "triggered")]
    Triggered,
    #[sea_orm(string_value = "position_opened")]
    PositionOpened,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// Events that drive the futures strategy state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuturesEvent {
    Trigger,
    PositionOpen,
    Complete,
    Cancel,
}

impl FuturesStatus {
    /// Transition table: current state x event -> next state.
    /// Returns `None` for invalid transitions.
    pub fn next(self, event: FuturesEvent) -> Option<FuturesStatus> {
        use FuturesEvent::*;
        use FuturesStatus::*;
        match (self, event) {
            (Waiting, Trigger) => Some(Triggered),
            (Triggered, PositionOpen) => Some(PositionOpened),
            (PositionOpened, Complete) => Some(Completed),
            (Waiting, Cancel) => Some(Cancelled),
            (Triggered, Cancel) => Some(Cancelled),
            (PositionOpened, Cancel) => Some(Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum OrderPurpose {
    #[sea_orm(string_value = "entry")]
    Entry,
    #[sea_orm(string_value = "take_profit")]
    TakeProfit,
    #[sea_orm(string_value = "stop_loss")]
    StopLoss,
}

/// Exchange-side order status, as reported by order polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum VenueOrderStatus {
    #[sea_orm(string_value = "new")]
    New,
    #[sea_orm(string_value = "partially_filled")]
    PartiallyFilled,
    #[sea_orm(string_value = "filled")]
    Filled,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "expired")]
    Expired,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl VenueOrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Expired | Self::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    #[sea_orm(string_value = "open")]
    Open,
    #[sea_orm(string_value = "closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(12))")]
#[serde(rename_all = "snake_case")]
pub enum MarginMode {
    #[sea_orm(string_value = "crossed")]
    Crossed,
    #[sea_orm(string_value = "isolated")]
    Isolated,
}

impl MarginMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crossed => "CROSSED",
            Self::Isolated => "ISOLATED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "snake_case")]
pub enum DualDirection {
    #[sea_orm(string_value = "up")]
    Up,
    #[sea_orm(string_value = "down")]
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "snake_case")]
pub enum DirectionPreference {
    #[sea_orm(string_value = "up")]
    Up,
    #[sea_orm(string_value = "down")]
    Down,
    #[sea_orm(string_value = "both")]
    Both,
}

impl DirectionPreference {
    pub fn accepts(self, direction: DualDirection) -> bool {
        match self {
            Self::Up => direction == DualDirection::Up,
            Self::Down => direction == DualDirection::Down,
            Self::Both => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum DualStrategyKind {
    #[sea_orm(string_value = "single")]
    Single,
    #[sea_orm(string_value = "auto_reinvest")]
    AutoReinvest,
    #[sea_orm(string_value = "ladder")]
    Ladder,
    #[sea_orm(string_value = "price_trigger")]
    PriceTrigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(12))")]
#[serde(rename_all = "snake_case")]
pub enum DualStrategyStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "paused")]
    Paused,
    #[sea_orm(string_value = "completed")]
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(12))")]
#[serde(rename_all = "snake_case")]
pub enum DualOrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "settled")]
    Settled,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(12))")]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "expired")]
    Expired,
    #[sea_orm(string_value = "sold_out")]
    SoldOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    #[sea_orm(string_value = "above")]
    Above,
    #[sea_orm(string_value = "below")]
    Below,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn futures_fsm_accepts_lifecycle_path() {
        let mut state = FuturesStatus::Waiting;
        for event in [FuturesEvent::Trigger, FuturesEvent::PositionOpen, FuturesEvent::Complete] {
            state = state.next(event).unwrap();
        }
        assert_eq!(state, FuturesStatus::Completed);
        assert!(state.is_terminal());
    }

    #[test]
    fn futures_fsm_rejects_double_trigger() {
        let triggered = FuturesStatus::Waiting.next(FuturesEvent::Trigger).unwrap();
        assert_eq!(triggered.next(FuturesEvent::Trigger), None);
    }

    #[test]
    fn futures_fsm_terminal_states_are_dead_ends() {
        for terminal in [FuturesStatus::Completed, FuturesStatus::Cancelled] {
            for event in [
                FuturesEvent::Trigger,
                FuturesEvent::PositionOpen,
                FuturesEvent::Complete,
                FuturesEvent::Cancel,
            ] {
                assert_eq!(terminal.next(event), None);
            }
        }
    }

    #[test]
    fn cancel_allowed_from_any_live_state() {
        for live in [
            FuturesStatus::Waiting,
            FuturesStatus::Triggered,
            FuturesStatus::PositionOpened,
        ] {
            assert_eq!(live.next(FuturesEvent::Cancel), Some(FuturesStatus::Cancelled));
        }
    }

    #[test]
    fn venue_status_terminality() {
        assert!(VenueOrderStatus::Filled.is_terminal());
        assert!(VenueOrderStatus::Rejected.is_terminal());
        assert!(!VenueOrderStatus::New.is_terminal());
        assert!(!VenueOrderStatus::PartiallyFilled.is_terminal());
    }
}
