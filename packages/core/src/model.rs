//! Record types and their optional lifecycle roles.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{BoxError, Context, Error, Spec};

/// Result of a lifecycle hook.
pub type HookResult = Result<(), BoxError>;

/// An optional lifecycle role a record type may provide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    BeforeSave,
    AfterSave,
    AfterLoad,
    BeforeDelete,
    AfterDelete,
}

impl Role {
    pub const ALL: &'static [Role] = &[
        Role::BeforeSave,
        Role::AfterSave,
        Role::AfterLoad,
        Role::BeforeDelete,
        Role::AfterDelete,
    ];

    /// Roles that run after the storage operation already took effect.
    pub fn is_post_commit(&self) -> bool {
        matches!(self, Role::AfterSave | Role::AfterLoad | Role::AfterDelete)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Role::BeforeSave => "before_save",
            Role::AfterSave => "after_save",
            Role::AfterLoad => "after_load",
            Role::BeforeDelete => "before_delete",
            Role::AfterDelete => "after_delete",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A record type that can be stored through the typed facades.
///
/// Implementors declare their schema in [`Model::spec`] and list the
/// lifecycle roles they provide in [`Model::ROLES`]. Hooks for roles not
/// listed are never called, so a type that lists none pays only the role
/// check.
///
/// # Example
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use stowage_core::{Context, Error, FieldSpec, HookResult, Model, Role, Spec};
///
/// #[derive(Serialize, Deserialize)]
/// struct User {
///     id: String,
///     email: String,
/// }
///
/// impl Model for User {
///     const ROLES: &'static [Role] = &[Role::BeforeSave];
///
///     fn spec() -> Result<Spec, Error> {
///         Spec::builder::<Self>()
///             .field(FieldSpec::string("id").primary_key())
///             .field(FieldSpec::string("email").not_null())
///             .build()
///     }
///
///     fn before_save(&mut self, _ctx: &Context) -> HookResult {
///         if !self.email.contains('@') {
///             return Err("email must contain '@'".into());
///         }
///         self.email = self.email.to_lowercase();
///         Ok(())
///     }
/// }
/// ```
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Lifecycle roles this type provides.
    const ROLES: &'static [Role] = &[];

    /// Declare the schema of this type.
    fn spec() -> Result<Spec, Error>;

    fn provides(role: Role) -> bool {
        Self::ROLES.contains(&role)
    }

    /// Runs before encoding. An error aborts the write.
    fn before_save(&mut self, _ctx: &Context) -> HookResult {
        Ok(())
    }

    /// Runs after the write committed.
    fn after_save(&self, _ctx: &Context) -> HookResult {
        Ok(())
    }

    /// Runs after decoding, before the value is returned.
    fn after_load(&mut self, _ctx: &Context) -> HookResult {
        Ok(())
    }

    /// Runs before a delete. There is no loaded record, only the key.
    fn before_delete(_ctx: &Context, _key: &str) -> HookResult {
        Ok(())
    }

    /// Runs after a successful delete.
    fn after_delete(_ctx: &Context, _key: &str) -> HookResult {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_commit_roles() {
        let post: Vec<Role> = Role::ALL
            .iter()
            .copied()
            .filter(Role::is_post_commit)
            .collect();
        assert_eq!(post, vec![Role::AfterSave, Role::AfterLoad, Role::AfterDelete]);
    }

    #[test]
    fn role_display() {
        assert_eq!(Role::BeforeDelete.to_string(), "before_delete");
    }
}
