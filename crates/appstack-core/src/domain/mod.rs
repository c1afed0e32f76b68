//! Domain model (ids, settlement state, errors, SAS, connection strings, resources).
//!
//! このモジュールは composer にも engine にも依存しません。
//! 値の形と純粋なフォーマット関数だけを定義します。

pub mod connection;
pub mod errors;
pub mod format;
pub mod ids;
pub mod resource;
pub mod sas;
pub mod secret;
pub mod state;

pub use self::connection::{ConnectionDescriptor, PoolBounds};
pub use self::errors::{ComposeError, FormatError};
pub use self::ids::{StepId, ValueId};
pub use self::resource::{ProvisionedResource, ResourceKind, ResourceRequest};
pub use self::sas::{HttpProtocol, Permissions, SasError, SasRequest, SignedResource, ValidityWindow};
pub use self::secret::Secret;
pub use self::state::{Failure, Settlement, ValueState};
