// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use anyhow::{bail, Result};
use deepfreeze::*;

fn vertex() -> Class {
    Class::new("Vertex", |init| {
        let x = init.arg(0)?;
        let y = init.arg(1)?;
        init.set_attr("x", x)?;
        init.set_attr("y", y)?;
        Ok(())
    })
}

fn segment() -> Class {
    Class::new("Segment", |init| {
        let start = init.arg(0)?;
        let end = init.arg(1)?;
        init.set_attr("start", start)?;
        init.set_attr("end", end)?;
        if let Some(label) = init.kwarg("label") {
            init.set_attr("label", label)?;
        }
        Ok(())
    })
}

// Classes live in a process-wide registry shared by every test.
fn register(class: Class) -> Result<()> {
    if lookup_class(class.name()).is_none() {
        match class.register() {
            Ok(()) | Err(FreezeError::Registry(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[test]
fn nested_instances_are_restored_through_the_registry() -> Result<()> {
    register(vertex())?;

    let a = vertex().construct(Arguments::new().arg(0i64).arg(0i64))?;
    let b = vertex().construct(Arguments::new().arg(3i64).arg(4i64))?;
    let s = segment().construct(
        Arguments::new()
            .arg(a)
            .arg(b)
            .kwarg("label", "diagonal"),
    )?;

    let restored = segment().restore(&s.persist()?)?;
    assert_eq!(restored, s);
    assert_eq!(restored.content_hash(), s.content_hash());
    assert_eq!(restored.attr("end")?.attr("y")?, Value::from(4i64));
    assert_eq!(restored.attr("label")?, Value::from("diagonal"));
    Ok(())
}

#[test]
fn unregistered_nested_class_cannot_be_restored() -> Result<()> {
    let ghost = Class::new("Ghost", |_| Ok(())).construct(Arguments::new().arg(1i64))?;
    let holder = Class::new("Holder", |_| Ok(()));
    let h = holder.construct(Arguments::new().arg(ghost))?;

    let bytes = h.persist()?;
    match holder.restore(&bytes) {
        Err(e @ FreezeError::UnknownClass(_)) => {
            assert_eq!(e.to_string(), "class 'Ghost' is not registered")
        }
        other => bail!("unexpected {other:?}"),
    }
    Ok(())
}

#[test]
fn restore_runs_the_initializer_again() -> Result<()> {
    let class = Class::new("Stamped", |init| {
        let total = init.number_arg(0)?.add(&init.number_arg(1)?)?;
        init.set_attr_value("total", total)?;
        Ok(())
    });
    let s = class.construct(Arguments::new().arg(2i64).arg(40i64))?;
    let restored = class.restore(&s.persist()?)?;
    assert_eq!(restored.attr("total")?, Value::from(42i64));
    assert_eq!(restored.field_names(), s.field_names());
    Ok(())
}

#[test]
fn records_and_buffers_persist() -> Result<()> {
    let class = Class::new("Bundle", |_| Ok(())).with_hash_reducer(reduce_buffers);

    let mut args = Arguments::new();
    let g = args.graph_mut();
    let record = g.object("Settings");
    let depth = g.number(3i64);
    g.set_field(record, "depth", depth)?;
    let buffer = g.buffer(NumericBuffer::from_f64(vec![0.25, 0.75]));
    args.push(record);
    args.push(buffer);

    let b = class.construct(args)?;
    let restored = class.restore(&b.persist()?)?;
    assert_eq!(restored, b);
    assert_eq!(restored.args()[0].attr("depth")?, Value::from(3i64));
    assert_eq!(restored.args()[1].as_buffer()?.to_f64_vec(), vec![0.25, 0.75]);
    Ok(())
}

#[test]
fn functions_and_proxies_are_not_persistable() -> Result<()> {
    let class = Class::new("Callback", |_| Ok(())).with_hash_reducer(|_, _| Ok(Value::Null));

    let mut args = Arguments::new();
    let f = args.graph_mut().function(
        "noop",
        Arc::new(|_: &[Value]| -> anyhow::Result<Thawed> { Ok(Thawed::from(Value::Null)) }),
    );
    args.push(f);
    let c = class.construct(args)?;
    assert!(matches!(c.persist(), Err(FreezeError::Persistence(_))));

    let mut args = Arguments::new();
    let p = args
        .graph_mut()
        .native(Arc::new(crate::freeze::Sensor::new(&[1])));
    args.push(p);
    let c = class.construct(args)?;
    assert!(matches!(c.persist(), Err(FreezeError::Persistence(_))));
    Ok(())
}

#[test]
fn corrupt_bytes_are_rejected() -> Result<()> {
    let class = vertex();
    let v = class.construct(Arguments::new().arg(1i64).arg(2i64))?;
    let mut bytes = v.persist()?;
    bytes.truncate(bytes.len() / 2);
    assert!(matches!(
        class.restore(&bytes),
        Err(FreezeError::Persistence(_))
    ));
    Ok(())
}

#[test]
fn restored_keywords_arrive_in_name_order() -> Result<()> {
    let tagged = Class::new("Tagged", |init| {
        let order = init.kwarg_names().collect::<Vec<_>>().join(",");
        init.set_attr_value("order", order.as_str())?;
        Ok(())
    });

    let t = tagged.construct(Arguments::new().kwarg("b", 1i64).kwarg("a", 2i64))?;
    assert_eq!(t.attr("order")?, Value::from("b,a"));

    let restored = tagged.restore(&t.persist()?)?;
    assert_eq!(restored, t);
    assert_eq!(restored.attr("order")?, Value::from("a,b"));
    Ok(())
}
