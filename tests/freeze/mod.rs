// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use deepfreeze::*;

/// A host object whose attributes are produced on demand.
#[derive(Debug)]
pub(crate) struct Sensor {
    type_name: &'static str,
    readings: Vec<i64>,
}

impl Sensor {
    pub(crate) fn new(readings: &[i64]) -> Self {
        Self::named("Sensor", readings)
    }

    pub(crate) fn named(type_name: &'static str, readings: &[i64]) -> Self {
        Self {
            type_name,
            readings: readings.to_vec(),
        }
    }
}

impl NativeValue for Sensor {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn key(&self) -> Value {
        Value::tuple(self.readings.iter().map(|r| Value::from(*r)).collect())
    }

    fn get_attr(&self, name: &str) -> anyhow::Result<Option<Thawed>> {
        match name {
            "readings" | "buffer" => {
                let mut g = Graph::new();
                let items: Vec<NodeId> = self.readings.iter().map(|r| g.number(*r)).collect();
                let root = g.list(items);
                Ok(Some(Thawed::new(g, root)))
            }
            "count" => Ok(Some(Thawed::from(Value::from(self.readings.len())))),
            "offline" => Err(anyhow!("sensor is offline")),
            _ => Ok(None),
        }
    }

    fn call(&self, args: &[Value]) -> anyhow::Result<Option<Thawed>> {
        let mut g = Graph::new();
        let items: Vec<NodeId> = args.iter().map(|a| g.import(a)).collect();
        let root = g.list(items);
        Ok(Some(Thawed::new(g, root)))
    }
}

#[test]
fn scalars_are_returned_unchanged() -> Result<()> {
    let mut g = Graph::new();
    let s = g.string("shared");
    let frozen = deepfreeze(&g, s)?;
    let again = deepfreeze(&g, s)?;
    assert!(frozen.ptr_eq(&again));
    assert_eq!(classify(g.node(s)?), Classification::Atomic);
    Ok(())
}

#[test]
fn nested_containers_become_immutable() -> Result<()> {
    let mut g = Graph::new();
    let (a, b) = (g.string("a"), g.string("b"));
    let one = g.number(1i64);
    let inner = g.list(vec![one, one]);
    let tags = g.set(vec![a, b, a]);
    let map = g.map(vec![(a, inner), (b, tags)]);

    let frozen = deepfreeze(&g, map)?;
    assert_eq!(frozen.type_name(), "frozen mapping");
    assert_eq!(frozen["a"], Value::from_json_str("[1, 1]")?);
    assert_eq!(frozen["b"].as_set()?.len(), 2);

    // The source graph is untouched and still mutable.
    g.push(inner, one)?;
    assert_eq!(g.items(inner)?.len(), 3);
    assert_eq!(frozen["a"].as_tuple()?.len(), 2);
    Ok(())
}

#[test]
fn shared_references_survive_freezing() -> Result<()> {
    let mut g = Graph::new();
    let x = g.list(vec![]);
    let key = g.string("k");
    let map = g.map(vec![(key, x)]);
    let root = g.tuple(vec![x, map]);

    let frozen = deepfreeze(&g, root)?;
    assert!(frozen[0].ptr_eq(&frozen[1]["k"]));
    Ok(())
}

#[test]
fn freezing_frozen_values_is_identity() -> Result<()> {
    let mut g = Graph::new();
    let one = g.number(1i64);
    let list = g.list(vec![one]);
    let first = deepfreeze(&g, list)?;
    let second = Thawed::from_value(&first).freeze()?;
    assert!(first.ptr_eq(&second));
    Ok(())
}

#[test]
fn cycles_are_errors() -> Result<()> {
    let mut g = Graph::new();
    let outer = g.list(vec![]);
    let inner = g.list(vec![outer]);
    g.push(outer, inner)?;
    assert!(matches!(
        deepfreeze(&g, outer),
        Err(FreezeError::CyclicGraph { .. })
    ));
    Ok(())
}

#[test]
fn unhashable_mapping_key_is_rejected() {
    let mut g = Graph::new();
    let buffer = g.buffer(NumericBuffer::from_i64(vec![1]));
    let value = g.null();
    let map = g.map(vec![(buffer, value)]);
    match deepfreeze(&g, map) {
        Err(e @ FreezeError::Unhashable { .. }) => {
            assert_eq!(
                e.to_string(),
                "unhashable frozen buffer cannot be used as a mapping key"
            )
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn buffers_are_copied_not_walked() -> Result<()> {
    let mut source = NumericBuffer::from_f64(vec![1.0, 2.0, 3.0]);
    let mut g = Graph::new();
    let id = g.buffer(source.clone());
    let frozen = deepfreeze(&g, id)?;

    source.apply_scalar(InPlaceOp::Mul, &Number::from(2i64))?;
    let buffer = frozen.as_buffer()?;
    assert_eq!(buffer.len(), 3);
    assert_eq!(buffer.to_f64_vec(), vec![1.0, 2.0, 3.0]);
    assert!(!frozen.is_hashable());
    assert!(buffer.reduce().is_hashable());
    Ok(())
}

#[test]
fn records_freeze_their_fields() -> Result<()> {
    let mut g = Graph::new();
    let obj = g.object("Config");
    let items = g.list(vec![]);
    g.set_field(obj, "items", items)?;

    let frozen = deepfreeze(&g, obj)?;
    assert_eq!(frozen.type_name(), "Config");
    assert_eq!(frozen.attr("items")?, Value::new_tuple());
    assert!(matches!(
        frozen.attr("missing"),
        Err(FreezeError::NoAttribute { .. })
    ));
    Ok(())
}

#[test]
fn frozen_functions_freeze_their_results() -> Result<()> {
    let mut g = Graph::new();
    let f = g.function(
        "listify",
        Arc::new(|args: &[Value]| -> anyhow::Result<Thawed> {
            let mut g = Graph::new();
            let items: Vec<NodeId> = args.iter().map(|a| g.import(a)).collect();
            let root = g.list(items);
            Ok(Thawed::new(g, root))
        }),
    );
    let frozen = deepfreeze(&g, f)?;
    let function = frozen.as_function()?;
    assert_eq!(function.name(), "listify");

    let result = function.call(&[Value::from(1i64), Value::from("a")])?;
    assert_eq!(result.type_name(), "tuple");
    assert!(result
        .apply(&Mutation::Append(Value::Null))
        .is_err_and(|e| e.is_forbidden_mutation()));
    Ok(())
}

#[test]
fn proxy_freezes_attributes_on_read() -> Result<()> {
    let mut g = Graph::new();
    let id = g.native(Arc::new(Sensor::new(&[4, 5])));
    let proxy = deepfreeze(&g, id)?;

    assert!(proxy.as_object()?.is_proxy());
    let readings = proxy.attr("readings")?;
    assert_eq!(readings, Value::from_json_str("[4, 5]")?);
    assert!(readings
        .apply(&Mutation::Append(Value::Null))
        .is_err_and(|e| e.is_forbidden_mutation()));
    assert_eq!(proxy.attr("count")?, Value::from(2usize));

    let called = proxy.as_object()?.call(&[Value::from(true)])?;
    assert_eq!(called, Value::tuple(vec![Value::from(true)]));
    Ok(())
}

#[test]
fn proxy_reports_host_failures_as_type_mismatch() -> Result<()> {
    let mut g = Graph::new();
    let id = g.native(Arc::new(Sensor::new(&[])));
    let proxy = deepfreeze(&g, id)?;

    match proxy.attr("offline") {
        Err(e @ FreezeError::TypeMismatch { .. }) => {
            assert!(e.to_string().contains("sensor is offline"), "{e}");
        }
        other => bail!("unexpected {other:?}"),
    }
    assert!(matches!(
        proxy.attr("missing"),
        Err(FreezeError::NoAttribute { .. })
    ));
    assert!(matches!(
        proxy.attr("__setitem__"),
        Err(FreezeError::ForbiddenMutation { .. })
    ));
    Ok(())
}

#[test]
fn proxies_compare_by_key() -> Result<()> {
    let mut g = Graph::new();
    let a = g.native(Arc::new(Sensor::new(&[1, 2])));
    let b = g.native(Arc::new(Sensor::new(&[1, 2])));
    let c = g.native(Arc::new(Sensor::new(&[2, 1])));
    let root = g.tuple(vec![a, b, c]);

    let frozen = deepfreeze(&g, root)?;
    assert_eq!(frozen[0], frozen[1]);
    assert_ne!(frozen[0], frozen[2]);
    Ok(())
}

#[test]
fn excluded_proxy_attributes_stay_mutable() -> Result<()> {
    register_mutable_attributes("Logger", ["buffer"])?;
    let mut g = Graph::new();
    let id = g.native(Arc::new(Sensor::named("Logger", &[1])));
    let proxy = deepfreeze(&g, id)?;

    let slot = match proxy.as_object()?.get_attr("buffer")? {
        Attribute::Raw(slot) => slot,
        other => bail!("buffer was frozen: {other:?}"),
    };
    slot.apply(&Mutation::Append(Value::from(2i64)))?;
    assert_eq!(slot.snapshot()?, Value::from_json_str("[1, 2]")?);
    // Other attributes are still frozen.
    assert!(proxy.as_object()?.get_attr("readings")?.as_frozen().is_some());
    Ok(())
}

#[test]
fn registered_frozen_types_are_stored_as_is() -> Result<()> {
    register_frozen_type("Timestamp")?;
    register_frozen_type("Timestamp")?;

    let native: Arc<dyn NativeValue> = Arc::new(Sensor::named("Timestamp", &[1700000000]));
    let mut g = Graph::new();
    let id = g.native(native.clone());
    assert!(classify(g.node(id)?).is_atomic());

    match deepfreeze(&g, id)? {
        Value::Native(stored) => assert!(Arc::ptr_eq(&stored, &native)),
        other => bail!("Timestamp was wrapped: {other:?}"),
    }
    Ok(())
}

#[test]
fn trace_walk_does_not_change_results() -> Result<()> {
    let mut g = Graph::new();
    let one = g.number(1i64);
    let list = g.list(vec![one]);
    let root = g.tuple(vec![list, list]);

    let options = FreezeOptions::default().with_trace_walk(true);
    let mut freezer = Freezer::with_options(&g, options);
    let frozen = freezer.freeze(root)?;
    assert!(frozen[0].ptr_eq(&frozen[1]));
    assert_eq!(freezer.memoized(), 2);
    Ok(())
}

#[test]
fn frozen_values_equal_their_sources() -> Result<()> {
    let mut g = Graph::new();
    let one = g.number(1i64);
    let list = g.list(vec![one]);
    let key = g.string("k");
    let map = g.map(vec![(key, list)]);

    let frozen = deepfreeze(&g, map)?;
    assert!(g.equals(map, &frozen));
    assert!(g.equals(list, &frozen["k"]));
    assert!(!g.equals(list, &frozen));
    Ok(())
}
