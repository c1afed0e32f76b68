//! Ports - 抽象化レイヤー
//!
//! 外部システム（プロビジョニングエンジン、時計）へのインターフェースを定義し、
//! 実装の詳細を隠蔽します。

pub mod clock;
pub mod provisioning;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::provisioning::{EngineError, ProvisioningEngine};
