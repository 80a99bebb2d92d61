//! Authorization: role definitions, the cached role-permission table, and the
//! per-document permission resolver.

pub mod cache;
pub mod resolver;
pub mod role;

pub use cache::{Clock, RolePermissionCache, SystemClock};
pub use resolver::{can_access, can_manage_user, ActorContext, DocumentContext};
pub use role::{Capability, CapabilityTable, PermissionType, Role, UnknownRole};
