//! Lifecycle hook dispatch.
//!
//! Each call checks `T::ROLES` first; a type that provides no roles never
//! reaches its hook methods. Failures are wrapped in `Error::Hook` with the
//! failing role. Post-commit failures are also logged, since the storage
//! operation they follow already took effect.

use stowage_core::{BoxError, Context, Error, Model, Role};

fn dispatch(role: Role, key: &str, result: Result<(), BoxError>) -> Result<(), Error> {
    result.map_err(|source| {
        if role.is_post_commit() {
            log::warn!("{} hook failed for '{}' after commit: {}", role, key, source);
        }
        Error::Hook { role, source }
    })
}

pub(crate) fn before_save<T: Model>(ctx: &Context, key: &str, record: &mut T) -> Result<(), Error> {
    if !T::provides(Role::BeforeSave) {
        return Ok(());
    }
    dispatch(Role::BeforeSave, key, record.before_save(ctx))
}

pub(crate) fn after_save<T: Model>(ctx: &Context, key: &str, record: &T) -> Result<(), Error> {
    if !T::provides(Role::AfterSave) {
        return Ok(());
    }
    dispatch(Role::AfterSave, key, record.after_save(ctx))
}

pub(crate) fn after_load<T: Model>(ctx: &Context, key: &str, record: &mut T) -> Result<(), Error> {
    if !T::provides(Role::AfterLoad) {
        return Ok(());
    }
    dispatch(Role::AfterLoad, key, record.after_load(ctx))
}

pub(crate) fn before_delete<T: Model>(ctx: &Context, key: &str) -> Result<(), Error> {
    if !T::provides(Role::BeforeDelete) {
        return Ok(());
    }
    dispatch(Role::BeforeDelete, key, T::before_delete(ctx, key))
}

pub(crate) fn after_delete<T: Model>(ctx: &Context, key: &str) -> Result<(), Error> {
    if !T::provides(Role::AfterDelete) {
        return Ok(());
    }
    dispatch(Role::AfterDelete, key, T::after_delete(ctx, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use stowage_core::{FieldSpec, HookResult, Spec};

    #[derive(Serialize, Deserialize)]
    struct Plain {
        id: String,
    }

    impl Model for Plain {
        fn spec() -> Result<Spec, Error> {
            Spec::builder::<Self>()
                .field(FieldSpec::string("id").primary_key())
                .build()
        }

        // Not listed in ROLES, so never dispatched.
        fn before_save(&mut self, _ctx: &Context) -> HookResult {
            Err("should not run".into())
        }
    }

    #[derive(Serialize, Deserialize)]
    struct Audited {
        id: String,
        saves: u32,
    }

    impl Model for Audited {
        const ROLES: &'static [Role] = &[Role::BeforeSave, Role::AfterDelete];

        fn spec() -> Result<Spec, Error> {
            Spec::builder::<Self>()
                .field(FieldSpec::string("id").primary_key())
                .field(FieldSpec::integer("saves"))
                .build()
        }

        fn before_save(&mut self, _ctx: &Context) -> HookResult {
            self.saves += 1;
            Ok(())
        }

        fn after_delete(_ctx: &Context, key: &str) -> HookResult {
            Err(format!("cannot audit {}", key).into())
        }
    }

    #[test]
    fn unlisted_roles_are_skipped() {
        let ctx = Context::background();
        let mut plain = Plain { id: "p".into() };
        assert!(before_save(&ctx, "p", &mut plain).is_ok());
    }

    #[test]
    fn listed_role_runs() {
        let ctx = Context::background();
        let mut rec = Audited {
            id: "a".into(),
            saves: 0,
        };
        before_save(&ctx, "a", &mut rec).unwrap();
        assert_eq!(rec.saves, 1);
    }

    #[test]
    fn failure_is_wrapped_with_role() {
        let ctx = Context::background();
        let err = after_delete::<Audited>(&ctx, "a").unwrap_err();
        assert!(matches!(err, Error::Hook { role: Role::AfterDelete, .. }));
        assert!(err.is_post_commit());
        assert!(err.to_string().contains("cannot audit a"));
    }
}
