// Position lifecycle: entry gating, stops, tiered targets and exits
pub mod position_manager;

pub use position_manager::{
    CooldownScope, EntrySkip, PositionConfig, PositionEvent, PositionManager, PositionSlot,
    PositionUpdate, WeaknessScore,
};
