// # zonesync-core
//
// Core library for reconciling DNS zones against provider state.
//
// ## Architecture Overview
//
// - **Record**: canonical, provider-agnostic resource record
// - **ZoneConfig**: desired records plus purge/ignore policy for one domain
// - **Normalizer**: canonicalizes record sets before comparison
// - **Differ**: classifies records into create/delete/modify/unchanged
// - **Sequencer**: orders the changeset into applicable corrections
// - **DnsProvider**: trait every vendor adapter implements
// - **ProviderRegistry**: explicit factory registry built by the caller
// - **ReconcileEngine**: drives plan/apply across zones concurrently
//
// ## Design Principles
//
// 1. **Pure core**: normalize, diff and sequence do no I/O
// 2. **Plain-data corrections**: a correction is a message plus a kind;
//    executing it is one adapter call
// 3. **No hidden registration**: adapters are registered by the composition root
// 4. **Library-first**: the binary is a thin wrapper over this crate

pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod ignore;
pub mod normalize;
pub mod providers;
pub mod record;
pub mod registry;
pub mod sequence;
pub mod traits;

// Re-export core types for convenience
pub use config::{EngineConfig, ProviderConfig, ReconcileConfig, ZoneConfig};
pub use diff::{ChangeKind, Changeset, Correlation, Differ};
pub use engine::{ApplyReport, EngineEvent, Mode, ReconcileEngine, ZoneOutcome, ZonePlan};
pub use error::{Error, Result};
pub use ignore::{GlobMatcher, LabelMatcher};
pub use normalize::Normalizer;
pub use record::{ProviderRef, Record, RecordData, RecordType};
pub use registry::ProviderRegistry;
pub use sequence::{Correction, CorrectionKind};
pub use traits::{DnsProvider, DnsProviderFactory};
