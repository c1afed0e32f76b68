//! Deferred - 遅延値の合成
//!
//! # 二層構造
//! - **表層（Typed）**: `Deferred<T>` ハンドル、タプル入力の `combine`
//! - **内部（Erased）**: `Composer` が持つ型消去済みノードと依存グラフ

pub mod combine;
pub mod composer;
pub mod graph;
pub mod input;

pub use self::combine::DeferredTuple;
pub use self::composer::{Composer, Deferred, Value};
pub use self::graph::DependencyGraph;
pub use self::input::{Input, RenderError, RenderMode};
