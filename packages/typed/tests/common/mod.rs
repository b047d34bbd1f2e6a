#![allow(dead_code)]

use std::cell::RefCell;

use serde::{Deserialize, Serialize};
use stowage_core::{Context, Error, FieldSpec, HookResult, Model, Role, Spec};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub age: i64,
    pub nickname: Option<String>,
}

impl Model for User {
    fn spec() -> Result<Spec, Error> {
        Spec::builder::<Self>()
            .field(FieldSpec::string("id").primary_key())
            .field(FieldSpec::string("email").unique().not_null())
            .field(FieldSpec::integer("age"))
            .field(FieldSpec::string("nickname").nullable())
            .build()
    }
}

pub fn user(id: &str, age: i64) -> User {
    User {
        id: id.to_string(),
        email: format!("{}@example.com", id),
        age,
        nickname: None,
    }
}

thread_local! {
    static EVENTS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

fn record(event: impl Into<String>) {
    EVENTS.with(|e| e.borrow_mut().push(event.into()));
}

/// Hook calls seen on this thread, oldest first.
pub fn events() -> Vec<String> {
    EVENTS.with(|e| e.borrow().clone())
}

pub fn clear_events() {
    EVENTS.with(|e| e.borrow_mut().clear());
}

/// A record with every lifecycle role. Behavior is steered by `body`:
/// "reject" fails BeforeSave, "fail-after" fails AfterSave, and the key
/// "locked" fails BeforeDelete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub body: String,
    pub loaded: bool,
}

impl Note {
    pub fn new(id: &str, body: &str) -> Self {
        Self {
            id: id.to_string(),
            body: body.to_string(),
            loaded: false,
        }
    }
}

impl Model for Note {
    const ROLES: &'static [Role] = Role::ALL;

    fn spec() -> Result<Spec, Error> {
        Spec::builder::<Self>()
            .field(FieldSpec::string("id").primary_key())
            .field(FieldSpec::string("body"))
            .field(FieldSpec::bool("loaded"))
            .build()
    }

    fn before_save(&mut self, _ctx: &Context) -> HookResult {
        record(format!("before_save:{}", self.id));
        if self.body == "reject" {
            return Err("body rejected".into());
        }
        self.body = self.body.trim().to_string();
        Ok(())
    }

    fn after_save(&self, _ctx: &Context) -> HookResult {
        record(format!("after_save:{}", self.id));
        if self.body == "fail-after" {
            return Err("after save failed".into());
        }
        Ok(())
    }

    fn after_load(&mut self, _ctx: &Context) -> HookResult {
        record(format!("after_load:{}", self.id));
        self.loaded = true;
        Ok(())
    }

    fn before_delete(_ctx: &Context, key: &str) -> HookResult {
        record(format!("before_delete:{}", key));
        if key == "locked" {
            return Err("locked".into());
        }
        Ok(())
    }

    fn after_delete(_ctx: &Context, key: &str) -> HookResult {
        record(format!("after_delete:{}", key));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doc {
    pub id: String,
    pub genre: String,
    pub year: i64,
    pub tags: Vec<String>,
}

impl Model for Doc {
    fn spec() -> Result<Spec, Error> {
        Spec::builder::<Self>()
            .field(FieldSpec::string("id").primary_key())
            .field(FieldSpec::string("genre"))
            .field(FieldSpec::integer("year"))
            .field(FieldSpec::composite("tags"))
            .build()
    }
}

pub fn doc(id: &str, genre: &str, year: i64, tags: &[&str]) -> Doc {
    Doc {
        id: id.to_string(),
        genre: genre.to_string(),
        year,
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub customer: String,
    pub total: f64,
    pub status: String,
    pub note: Option<String>,
}

impl Model for Order {
    fn spec() -> Result<Spec, Error> {
        Spec::builder::<Self>()
            .field(FieldSpec::integer("id").primary_key())
            .field(FieldSpec::string("customer").column("customer_id"))
            .field(FieldSpec::float("total"))
            .field(FieldSpec::string("status"))
            .field(FieldSpec::string("note").nullable())
            .build()
    }
}

pub fn order(id: i64, customer: &str, total: f64, status: &str) -> Order {
    Order {
        id,
        customer: customer.to_string(),
        total,
        status: status.to_string(),
        note: None,
    }
}
