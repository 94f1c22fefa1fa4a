// bladectl-core: Target-state reconciler between key input and a blade's remote keywords.

pub mod action;
pub mod autorepeat;
pub mod config;
pub mod device;
pub mod error;
pub mod reconciler;
pub mod sim;
pub mod state;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use action::{Action, WritePolicy, diff};
pub use autorepeat::{Key, KeyRepeater};
pub use config::{Bounds, ReconcilerSettings};
pub use device::{DeviceLink, ObservedUpdate};
pub use error::CoreError;
pub use reconciler::{LoopStats, Reconciler, WeakReconciler};
pub use sim::{SimulatedBlade, SimulatorConfig};
pub use state::{Direction, Field, Input, ObservedState, SourceAdjustment, TargetState};
pub use stream::StateStream;
