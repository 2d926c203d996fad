// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use anyhow::{bail, Result};
use deepfreeze::*;

fn point() -> Class {
    Class::new("Point", |init| {
        let x = init.arg(0)?;
        let y = init.arg(1)?;
        init.set_attr("x", x)?;
        init.set_attr("y", y)?;
        Ok(())
    })
}

fn point_args(x: i64, y: &[i64]) -> Arguments {
    let mut args = Arguments::new();
    let g = args.graph_mut();
    let x = g.number(x);
    let items: Vec<NodeId> = y.iter().map(|v| g.number(*v)).collect();
    let y = g.list(items);
    args.push(x);
    args.push(y);
    args
}

fn ints(values: &[i64]) -> Value {
    Value::tuple(values.iter().map(|v| Value::from(*v)).collect())
}

#[test]
fn point_fields_are_frozen() -> Result<()> {
    let p = point().construct(point_args(1, &[2, 3]))?;

    assert_eq!(p.attr("x")?, Value::from(1i64));
    assert_eq!(p.attr("y")?, ints(&[2, 3]));
    assert!(p.is_locked());

    match p.attr("y")?.apply(&Mutation::Append(Value::from(4i64))) {
        Err(e @ FreezeError::ForbiddenMutation { .. }) => {
            assert!(e.to_string().contains("item/slice mutation"), "{e}");
        }
        other => bail!("append was not rejected: {other:?}"),
    }
    assert_eq!(p.attr("y")?, ints(&[2, 3]));
    Ok(())
}

#[test]
fn restore_of_persist_is_equal() -> Result<()> {
    let p = point().construct(point_args(1, &[2, 3]))?;
    let q = point().restore(&p.persist()?)?;
    assert_eq!(p, q);
    assert_eq!(p.content_hash(), q.content_hash());
    assert_eq!(q.attr("y")?, ints(&[2, 3]));
    Ok(())
}

#[test]
fn equality_does_not_depend_on_how_arguments_were_built() -> Result<()> {
    let from_list = point().construct(point_args(1, &[2, 3]))?;
    let from_tuple = point().construct(Arguments::new().arg(1.0).arg(ints(&[2, 3])))?;

    assert_eq!(from_list, from_tuple);
    assert_eq!(from_list.content_hash(), from_tuple.content_hash());
    Ok(())
}

#[test]
fn different_arguments_are_different_instances() -> Result<()> {
    let a = point().construct(point_args(1, &[2, 3]))?;
    let b = point().construct(point_args(1, &[3, 2]))?;
    assert_ne!(a, b);

    let renamed = Class::new("Vector", |_| Ok(())).construct(point_args(1, &[2, 3]))?;
    assert_ne!(Value::from(a), Value::from(renamed));
    Ok(())
}

#[test]
fn display_shows_captured_arguments() -> Result<()> {
    let p = point().construct(point_args(1, &[2, 3]).kwarg("label", "origin"))?;
    assert_eq!(p.to_string(), r#"Point(1, [2,3], label="origin")"#);
    Ok(())
}

fn measurement() -> Class {
    Class::new("Measurement", |init| {
        if init.arg_count() > 0 {
            let data = init.arg(0)?;
            init.set_attr("data", data)?;
        }
        Ok(())
    })
}

#[test]
fn unhashable_positional_argument_is_reported_by_position() -> Result<()> {
    let mut args = Arguments::new().arg(1i64);
    let buffer = args
        .graph_mut()
        .buffer(NumericBuffer::from_f64(vec![0.5, 1.5]));
    args.push(buffer);

    match measurement().construct(args) {
        Err(
            e @ FreezeError::Construction {
                argument: ArgumentRef::Position(1),
                ..
            },
        ) => {
            let message = e.to_string();
            assert!(message.starts_with("Measurement"), "{message}");
            assert!(message.contains("at position 1"), "{message}");
        }
        other => bail!("unexpected {other:?}"),
    }
    Ok(())
}

#[test]
fn unhashable_keyword_argument_is_reported_by_name() -> Result<()> {
    let samples = Value::from(NumericBuffer::from_i64(vec![1, 2, 3]).freeze());
    let args = Arguments::new().kwarg("samples", samples);

    match measurement().construct(args) {
        Err(FreezeError::Construction {
            argument: ArgumentRef::Keyword(name),
            ..
        }) => assert_eq!(name.as_ref(), "samples"),
        other => bail!("unexpected {other:?}"),
    }
    Ok(())
}

#[test]
fn hash_reducer_accepts_buffers() -> Result<()> {
    let class = measurement().with_hash_reducer(reduce_buffers);
    let build = || {
        let mut args = Arguments::new();
        let buffer = args
            .graph_mut()
            .buffer(NumericBuffer::from_f64(vec![0.5, 1.5]));
        args.push(buffer);
        args
    };

    let a = class.construct(build())?;
    let b = class.construct(build())?;
    assert_eq!(a, b);
    assert_eq!(a.content_hash(), b.content_hash());
    assert!(a.attr("data")?.as_buffer().is_ok());
    Ok(())
}

#[test]
fn failing_reducer_is_a_host_error() {
    let class = measurement().with_hash_reducer(|_, _| bail!("cannot reduce"));
    assert!(matches!(
        class.construct(Arguments::new().arg(1i64)),
        Err(FreezeError::Host { .. })
    ));
}

#[test]
fn initializer_may_mutate_self() -> Result<()> {
    let class = Class::new("Journal", |init| {
        let g = init.graph_mut();
        let history = g.list(vec![]);
        let first = g.string("opened");
        g.push(history, first)?;
        init.set_attr("history", history)?;
        init.set_attr_value("count", 1i64)?;
        init.apply(&Mutation::set_attr("count", 2i64))?;
        init.apply(&Mutation::del_attr("count"))?;
        init.set_attr_value("entries", 1i64)?;
        Ok(())
    });

    let journal = class.construct(Arguments::new())?;
    assert_eq!(journal.attr("history")?, Value::tuple(vec!["opened".into()]));
    assert_eq!(journal.attr("entries")?, Value::from(1i64));
    assert!(matches!(
        journal.attr("count"),
        Err(FreezeError::NoAttribute { .. })
    ));
    Ok(())
}

#[test]
fn self_referencing_field_is_a_cycle() {
    let class = Class::new("Loop", |init| {
        let me = init.this();
        init.set_attr("me", me)?;
        Ok(())
    });
    assert!(matches!(
        class.construct(Arguments::new()),
        Err(FreezeError::CyclicGraph { .. })
    ));
}

#[test]
fn self_containing_argument_is_a_cycle() -> Result<()> {
    let mut args = Arguments::new();
    let g = args.graph_mut();
    let list = g.list(vec![]);
    g.push(list, list)?;
    args.push(list);

    let class = Class::new("Holder", |init| {
        let items = init.arg(0)?;
        init.set_attr("items", items)?;
        Ok(())
    });
    assert!(matches!(
        class.construct(args),
        Err(FreezeError::CyclicGraph { node }) if node == list
    ));
    Ok(())
}

#[test]
fn fields_and_arguments_share_frozen_values() -> Result<()> {
    let p = point().construct(point_args(1, &[2, 3]))?;
    assert!(p.attr("y")?.ptr_eq(&p.args()[1]));
    Ok(())
}

#[test]
fn locked_instance_rejects_every_protected_operation() -> Result<()> {
    let p = point().construct(point_args(1, &[2, 3]))?;
    for op in ProtectedOp::all() {
        match p.apply(&crate::protected::mutation_for(op)) {
            Err(FreezeError::ForbiddenMutation { operation, .. }) => assert_eq!(operation, op),
            other => bail!("{op} was not rejected: {other:?}"),
        }
    }
    Ok(())
}

#[test]
fn protected_method_names_are_not_readable() {
    let p = match point().construct(point_args(1, &[2, 3])) {
        Ok(p) => p,
        Err(e) => panic!("{e}"),
    };
    for op in ProtectedOp::all() {
        assert!(matches!(
            p.get_attr(op.method_name()),
            Err(FreezeError::ForbiddenMutation { operation, .. }) if operation == op
        ));
    }
}

#[test]
fn protections_can_be_disabled() -> Result<()> {
    let class = point().with_options(FreezeOptions::default().with_protections(false));
    let p = class.construct(point_args(1, &[2, 3]))?;
    assert!(!p.is_locked());

    p.apply(&Mutation::set_attr("z", 5i64))?;
    assert_eq!(p.attr("z")?, Value::from(5i64));
    p.apply(&Mutation::del_attr("x"))?;
    assert!(matches!(p.attr("x"), Err(FreezeError::NoAttribute { .. })));

    // Field values are still frozen.
    assert!(p
        .attr("y")?
        .apply(&Mutation::Append(Value::Null))
        .is_err_and(|e| e.is_forbidden_mutation()));
    Ok(())
}

#[test]
fn methods_receive_the_instance() -> Result<()> {
    let class = Class::new("Doubler", |init| {
        let x = init.arg(0)?;
        init.set_attr("x", x)?;
        let g = init.graph_mut();
        let method = g.function(
            "pair",
            Arc::new(|args: &[Value]| -> anyhow::Result<Thawed> {
                let x = args[0].attr("x")?;
                let mut g = Graph::new();
                let a = g.import(&x);
                let b = g.import(&x);
                let root = g.list(vec![a, b]);
                Ok(Thawed::new(g, root))
            }),
        );
        init.set_attr("pair", method)?;
        Ok(())
    });

    let d = Arc::new(class.construct(Arguments::new().arg(7i64))?);
    assert_eq!(d.call_method("pair", &[])?, ints(&[7, 7]));
    assert!(matches!(
        d.call_method("x", &[]),
        Err(FreezeError::TypeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn bases_share_exclusions_but_not_initializers() -> Result<()> {
    register_mutable_attributes("TrackedBase", ["scratch"])?;
    let base = Class::new("TrackedBase", |init| {
        init.set_attr_value("base", true)?;
        Ok(())
    });
    let derived = Class::new("TrackedDerived", |init| {
        let g = init.graph_mut();
        let scratch = g.list(vec![]);
        init.set_attr("scratch", scratch)?;
        Ok(())
    })
    .with_base(&base);

    let t = derived.construct(Arguments::new())?;
    assert!(matches!(t.attr("base"), Err(FreezeError::NoAttribute { .. })));

    let slot = match t.get_attr("scratch")? {
        Attribute::Raw(slot) => slot,
        other => bail!("scratch was frozen: {other:?}"),
    };
    slot.apply(&Mutation::Append(Value::from(1i64)))?;
    slot.apply(&Mutation::Append(Value::from(2i64)))?;
    assert_eq!(t.attr("scratch")?, ints(&[1, 2]));
    Ok(())
}
