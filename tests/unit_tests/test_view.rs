// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::Result;
use dns_frontend_rs::{
    message::{
        name::Name,
        opcode::{RdClass, RecordType},
        record::Record,
    },
    view::{Lookup, View, ViewRegistry},
};

fn sample_view(name: &str, class: RdClass) -> Result<View> {
    let mut view = View::new(name, class);
    let owner = Name::from_ascii("host.example.com.")?;
    view.add_record(Record::a(owner.clone(), class, 300, "10.1.2.3".parse()?));
    view.add_record(Record::txt(owner, class, 300, "hello"));
    Ok(view)
}

#[test]
fn lookup_filters_by_type() -> Result<()> {
    let view = sample_view("primary", RdClass::In)?;
    let owner = Name::from_ascii("HOST.example.com.")?;

    match view.lookup(&owner, RecordType::A as u16) {
        Lookup::Records(records) => {
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].rtype, RecordType::A as u16);
        },
        other => panic!("expected records, got {other:?}"),
    }
    Ok(())
}

#[test]
fn lookup_any_returns_the_whole_rrset() -> Result<()> {
    let view = sample_view("primary", RdClass::In)?;
    let owner = Name::from_ascii("host.example.com.")?;

    match view.lookup(&owner, RecordType::Any as u16) {
        Lookup::Records(records) => assert_eq!(records.len(), 2),
        other => panic!("expected records, got {other:?}"),
    }
    Ok(())
}

#[test]
fn lookup_distinguishes_norecords_from_nxdomain() -> Result<()> {
    let view = sample_view("primary", RdClass::In)?;

    let owner = Name::from_ascii("host.example.com.")?;
    assert_eq!(
        view.lookup(&owner, RecordType::Aaaa as u16),
        Lookup::NoRecords
    );

    let missing = Name::from_ascii("other.example.com.")?;
    assert_eq!(view.lookup(&missing, RecordType::A as u16), Lookup::NxDomain);
    Ok(())
}

#[test]
fn registry_matches_the_first_view_of_a_class() -> Result<()> {
    let registry = ViewRegistry::new();
    registry.register(Arc::new(sample_view("first", RdClass::In)?));
    registry.register(Arc::new(sample_view("second", RdClass::In)?));
    registry.register(Arc::new(View::new("chaos", RdClass::Ch)));

    let matched = registry
        .match_class(RdClass::In as u16)
        .expect("class IN registered");
    assert_eq!(matched.name, "first");

    let chaos = registry
        .match_class(RdClass::Ch as u16)
        .expect("class CH registered");
    assert_eq!(chaos.name, "chaos");

    assert!(registry.match_class(RdClass::Hs as u16).is_none());
    assert_eq!(registry.len(), 3);
    Ok(())
}
