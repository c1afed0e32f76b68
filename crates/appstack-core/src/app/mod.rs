//! App - アプリケーション層
//!
//! composer と ports を組み合わせて、デプロイ構成の宣言と実行を行います。
//!
//! # 主要コンポーネント
//! - **Stack**: リソース宣言・ステップ・export の集合
//! - **topology**: App Service 構成の組み立て
//! - **Deployment**: ステップを engine に渡すドライバ
//! - **preview**: 未確定値と secret を伏せた JSON 表示
//! - **DeploymentReport**: 結果の集計

pub mod deployment;
pub mod preview;
pub mod report;
pub mod stack;
pub mod topology;

pub use self::deployment::{DeployError, Deployment};
pub use self::preview::preview;
pub use self::report::{DeploymentReport, StepRecord, StepStatus};
pub use self::stack::{ResourceDeclaration, ResourceHandle, Stack, Step, StepKind};
pub use self::topology::{AppServiceStack, app_service_stack};
