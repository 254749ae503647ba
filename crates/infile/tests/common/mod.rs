//! Record types shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use infile::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomerType {
    Residential,
    Business,
}

impl SqlEnum for CustomerType {
    fn ordinal(&self) -> u32 {
        *self as u32
    }

    fn name(&self) -> &'static str {
        match self {
            CustomerType::Residential => "RESIDENTIAL",
            CustomerType::Business => "BUSINESS",
        }
    }
}

/// Generated key, no relationships.
#[derive(Debug, Default)]
pub struct Customer {
    pub id: Option<i64>,
    pub last_seen_on: Option<NaiveDate>,
    pub kind: Option<CustomerType>,
}

impl Record for Customer {
    const TABLE_NAME: &'static str = "customer";

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id", "id", SqlType::BigInt)
                .primary_key(true)
                .auto_increment(true),
            FieldInfo::new("last_seen_on", "last_seen_on", SqlType::Date).nullable(true),
            FieldInfo::new("kind", "type", SqlType::VarChar(16))
                .nullable(true)
                .enumerated(EnumType::String),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("last_seen_on", self.last_seen_on.into()),
            ("kind", Value::from_enum_opt(self.kind.as_ref())),
        ]
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

/// Child-dependent on `Customer`, parent of `OrderLine`s.
#[derive(Debug, Default)]
pub struct Order {
    pub id: Option<i64>,
    pub reference: String,
    pub customer: Option<Shared<Customer>>,
    pub lines: Vec<Shared<OrderLine>>,
}

impl Record for Order {
    const TABLE_NAME: &'static str = "orders";
    const RELATIONSHIPS: &'static [RelationshipInfo] = &[
        RelationshipInfo::many_to_one("customer", RecordType::of::<Customer>, "customer_id"),
        RelationshipInfo::one_to_many("lines", RecordType::of::<OrderLine>),
    ];

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id", "id", SqlType::BigInt)
                .primary_key(true)
                .auto_increment(true),
            FieldInfo::new("reference", "reference", SqlType::VarChar(32)),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("reference", self.reference.clone().into()),
        ]
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn related(&self, name: &str) -> Result<Related> {
        match name {
            "customer" => Ok(Related::one(self.customer.as_ref())),
            "lines" => Ok(Related::many(&self.lines)),
            _ => Err(Error::traversal("Order", Some(name), "unknown relationship")),
        }
    }
}

/// Line of an `Order`; its back-reference carries the order key.
#[derive(Debug, Default)]
pub struct OrderLine {
    pub id: Option<i64>,
    pub sku: String,
    pub note: String,
    pub order: Option<Shared<Order>>,
}

impl Record for OrderLine {
    const TABLE_NAME: &'static str = "order_line";
    const RELATIONSHIPS: &'static [RelationshipInfo] = &[RelationshipInfo::many_to_one(
        "order",
        RecordType::of::<Order>,
        "order_id",
    )];

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id", "id", SqlType::BigInt)
                .primary_key(true)
                .auto_increment(true),
            FieldInfo::new("sku", "sku", SqlType::VarChar(16)),
            FieldInfo::new("note", "note", SqlType::Text),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("sku", self.sku.clone().into()),
            ("note", self.note.clone().into()),
        ]
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn related(&self, name: &str) -> Result<Related> {
        match name {
            "order" => Ok(Related::one(self.order.as_ref())),
            _ => Err(Error::traversal("OrderLine", Some(name), "unknown relationship")),
        }
    }
}

/// Split over `person` and the secondary table `person_detail`, with a
/// profile sharing its key.
#[derive(Debug, Default)]
pub struct Person {
    pub id: Option<i64>,
    pub name: String,
    pub bio: Option<String>,
    pub profile: Option<Shared<Profile>>,
}

impl Record for Person {
    const TABLE_NAME: &'static str = "person";
    const SECONDARY_TABLES: &'static [SecondaryTable] =
        &[SecondaryTable::new("person_detail", "person_id")];
    const RELATIONSHIPS: &'static [RelationshipInfo] =
        &[RelationshipInfo::one_to_one("profile", RecordType::of::<Profile>).primary_key_join(true)];

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id", "id", SqlType::BigInt)
                .primary_key(true)
                .auto_increment(true),
            FieldInfo::new("name", "name", SqlType::VarChar(64)),
            FieldInfo::new("bio", "bio", SqlType::Text)
                .nullable(true)
                .secondary_table("person_detail"),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("name", self.name.clone().into()),
            ("bio", self.bio.clone().into()),
        ]
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn related(&self, name: &str) -> Result<Related> {
        match name {
            "profile" => Ok(Related::one(self.profile.as_ref())),
            _ => Err(Error::traversal("Person", Some(name), "unknown relationship")),
        }
    }
}

/// Keyed by its person's id.
#[derive(Debug, Default)]
pub struct Profile {
    pub id: Option<i64>,
    pub handle: String,
}

impl Record for Profile {
    const TABLE_NAME: &'static str = "profile";

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::new("id", "id", SqlType::BigInt).primary_key(true),
            FieldInfo::new("handle", "handle", SqlType::VarChar(32)),
        ];
        FIELDS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.into()),
            ("handle", self.handle.clone().into()),
        ]
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

pub fn customer() -> Shared<Customer> {
    shared(Customer::default())
}

/// An order for `customer` with one line per sku, back-references wired.
pub fn order_with_lines(customer: Option<&Shared<Customer>>, skus: &[&str]) -> Shared<Order> {
    let order = shared(Order {
        reference: "PO-1".to_string(),
        customer: customer.map(Arc::clone),
        ..Order::default()
    });
    let lines = skus
        .iter()
        .map(|sku| {
            shared(OrderLine {
                sku: (*sku).to_string(),
                order: Some(Arc::clone(&order)),
                ..OrderLine::default()
            })
        })
        .collect();
    order.write().unwrap().lines = lines;
    order
}
