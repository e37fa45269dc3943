// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Views: named, class-tagged zone scopes, and the registry the client
//! core matches requests against.
//!
//! A view is assembled once (usually from configuration), wrapped in an
//! `Arc` and registered; it is never mutated afterwards. The registry
//! keeps the ordered list behind a reader/writer lock so a concurrent
//! registration can never tear a match walk.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tracing::debug;

use crate::message::{
    name::Name,
    opcode::{RdClass, RecordType},
    record::Record,
};

/// Outcome of a record lookup inside one view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Records of the requested type at the owner name.
    Records(Vec<Record>),
    /// The owner name exists but carries no record of that type.
    NoRecords,
    /// The owner name does not exist in this view.
    NxDomain,
}

#[derive(Debug)]
pub struct View {
    pub name: String,
    pub rdclass: RdClass,
    records: HashMap<Name, Vec<Record>>,
}

impl View {
    pub fn new(name: impl Into<String>, rdclass: RdClass) -> Self {
        Self {
            name: name.into(),
            rdclass,
            records: HashMap::new(),
        }
    }

    pub fn add_record(&mut self, record: Record) {
        self.records
            .entry(record.name.clone())
            .or_default()
            .push(record);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// ANY returns everything at the owner; any other type filters.
    pub fn lookup(&self, name: &Name, qtype: u16) -> Lookup {
        let Some(rrset) = self.records.get(name) else {
            return Lookup::NxDomain;
        };

        let matched: Vec<Record> = if qtype == RecordType::Any as u16 {
            rrset.clone()
        } else {
            rrset.iter().filter(|r| r.rtype == qtype).cloned().collect()
        };

        if matched.is_empty() {
            Lookup::NoRecords
        } else {
            Lookup::Records(matched)
        }
    }
}

#[derive(Debug, Default)]
pub struct ViewRegistry {
    views: RwLock<Vec<Arc<View>>>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, view: Arc<View>) {
        let mut views = self.views.write().unwrap_or_else(|e| e.into_inner());
        debug!(view = %view.name, class = %view.rdclass, "view registered");
        views.push(view);
    }

    /// First registered view whose class equals `class`.
    pub fn match_class(&self, class: u16) -> Option<Arc<View>> {
        let views = self.views.read().unwrap_or_else(|e| e.into_inner());
        views.iter().find(|v| v.rdclass as u16 == class).cloned()
    }

    pub fn len(&self) -> usize {
        self.views.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
