// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use anyhow::{bail, Result};
use deepfreeze::*;
use serde::Deserialize;

#[derive(Deserialize, Debug)]
struct Case {
    method_name: String,
    description: String,
    category: String,
}

#[derive(Deserialize, Debug)]
struct YamlTest {
    cases: Vec<Case>,
}

/// A representative mutation performing `op`.
pub(crate) fn mutation_for(op: ProtectedOp) -> Mutation {
    match op {
        ProtectedOp::SetAttr => Mutation::set_attr("name", 1i64),
        ProtectedOp::DelAttr => Mutation::del_attr("name"),
        ProtectedOp::SetItem => Mutation::set_item(0i64, 1i64),
        ProtectedOp::DelItem => Mutation::DelItem {
            key: Value::from(0i64),
        },
        ProtectedOp::SetSlice => Mutation::SetSlice {
            start: 0,
            stop: 1,
            values: vec![Value::Null],
        },
        ProtectedOp::DelSlice => Mutation::DelSlice { start: 0, stop: 1 },
        ProtectedOp::Set => Mutation::SetProperty {
            name: "name".into(),
            value: Value::from(1i64),
        },
        ProtectedOp::Delete => Mutation::DelProperty {
            name: "name".into(),
        },
        ProtectedOp::InPlace(op) => Mutation::in_place(op, 2i64),
    }
}

#[test]
fn operation_table() -> Result<()> {
    let yaml = std::fs::read_to_string("tests/protected/cases.yaml")?;
    let test: YamlTest = serde_yaml::from_str(&yaml)?;

    let all: Vec<ProtectedOp> = ProtectedOp::all().collect();
    assert_eq!(test.cases.len(), all.len());

    for (case, expected) in test.cases.iter().zip(all) {
        let Some(op) = ProtectedOp::from_method_name(&case.method_name) else {
            bail!("{} is not a protected operation", case.method_name);
        };
        assert_eq!(op, expected, "{}", case.method_name);
        assert_eq!(op.description(), case.description);
        assert_eq!(op.category(), case.category);
    }
    assert_eq!(ProtectedOp::from_method_name("__getitem__"), None);
    Ok(())
}

fn frozen_samples() -> Result<Vec<Value>> {
    let mut g = Graph::new();
    let one = g.number(1i64);
    let name = g.string("name");
    let list = g.list(vec![one, name]);
    let map = g.map(vec![(name, one)]);
    let set = g.set(vec![one]);
    let buffer = g.buffer(NumericBuffer::from_i64(vec![1, 2]));
    let record = g.object("Record");
    g.set_field(record, "name", list)?;
    let function = g.function(
        "identity",
        Arc::new(|args: &[Value]| -> anyhow::Result<Thawed> {
            Ok(Thawed::from_value(&args[0]))
        }),
    );
    let proxy = g.native(Arc::new(crate::freeze::Sensor::new(&[3, 4])));

    let mut samples = vec![Value::from(1i64), Value::from("text")];
    for id in [list, map, set, buffer, record, function, proxy] {
        samples.push(deepfreeze(&g, id)?);
    }
    Ok(samples)
}

#[test]
fn frozen_values_reject_every_operation() -> Result<()> {
    for value in frozen_samples()? {
        let before = value.to_string();
        for op in ProtectedOp::all() {
            match value.apply(&mutation_for(op)) {
                Err(FreezeError::ForbiddenMutation {
                    type_name,
                    operation,
                }) => {
                    assert_eq!(operation, op);
                    assert!(!type_name.is_empty());
                }
                other => bail!("{} accepted {op}: {other:?}", value.type_name()),
            }
        }
        assert_eq!(value.to_string(), before);
    }
    Ok(())
}

#[test]
fn error_names_type_operation_and_category() -> Result<()> {
    let mut g = Graph::new();
    let list = g.list(vec![]);
    let frozen = deepfreeze(&g, list)?;

    let err = match frozen.apply(&Mutation::in_place(InPlaceOp::Add, Value::tuple(vec![]))) {
        Err(e) => e,
        Ok(()) => bail!("in-place add was accepted"),
    };
    assert_eq!(
        err.to_string(),
        r#"tuple does not support in-place "add" (in-place arithmetic)"#
    );
    Ok(())
}

#[test]
fn mutable_graph_accepts_ordinary_mutations() -> Result<()> {
    let mut g = Graph::new();
    let one = g.number(1i64);
    let list = g.list(vec![one]);
    g.apply(list, &Mutation::Append(Value::from(2i64)))?;
    g.apply(
        list,
        &Mutation::SetSlice {
            start: 0,
            stop: 1,
            values: vec![Value::from(0i64), Value::from(1i64)],
        },
    )?;
    g.apply(list, &Mutation::DelSlice { start: 2, stop: 3 })?;
    assert_eq!(
        deepfreeze(&g, list)?,
        Value::tuple(vec![Value::from(0i64), Value::from(1i64)])
    );

    let object = g.object("Record");
    g.apply(object, &Mutation::set_attr("name", "x"))?;
    assert!(g.field(object, "name")?.is_some());
    g.apply(object, &Mutation::del_attr("name"))?;
    assert!(g.field(object, "name")?.is_none());
    Ok(())
}
