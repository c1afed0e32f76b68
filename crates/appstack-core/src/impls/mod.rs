//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryEngine**: 記録するだけのプロビジョニングエンジン
//!
//! 本番用の engine は別クレートに置く想定です。

pub mod inmem_engine;

pub use self::inmem_engine::{InMemoryEngine, SAS_OPERATION};
