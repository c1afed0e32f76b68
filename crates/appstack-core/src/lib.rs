//! appstack-core
//!
//! Deferred-value composition for an App Service deployment topology.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, errors, secret, sas, connection, resource, format）
//! - **deferred**: 遅延値の合成（Composer, Deferred, DependencyGraph, Input）
//! - **ports**: 抽象化レイヤー（ProvisioningEngine, Clock）
//! - **impls**: 実装（InMemoryEngine など開発用）
//! - **config**: スタック設定（sqlPassword は必須）
//! - **app**: アプリケーションロジック（topology, deployment, preview, report）

pub mod app;
pub mod config;
pub mod deferred;
pub mod domain;
pub mod impls;
pub mod ports;
