use assert_call::{call, CallRecorder};
use propflow::{
    Assign, ComputedSpec, Error, Model, ModelConfig, ModelSpec, ModelType, ReadOnly,
    ReadOnlySetBehavior, StateSpec, Subscription,
};

fn single(spec: StateSpec<i32>) -> Model<i32> {
    let ty = ModelSpec::new().state("a", spec).build().unwrap();
    Model::new(&ty, ModelConfig::new()).unwrap()
}

fn log_changes(m: &Model<i32>, name: &str) -> Subscription {
    let label = name.to_owned();
    m.on_change(name, move |c| {
        call!("{label} {} -> {}", c.old_value, c.new_value)
    })
    .unwrap()
}

#[test]
fn get_set() {
    let m = single(StateSpec::new().init(1));
    assert_eq!(m.get("a").unwrap(), 1);
    m.set("a", 2).unwrap();
    assert_eq!(m.get("a").unwrap(), 2);
}

#[test]
fn unset_state_reads_default() {
    let m = single(StateSpec::new());
    assert_eq!(m.get("a").unwrap(), 0);
}

#[test]
fn set_notifies() {
    let mut cr = CallRecorder::new();
    let m = single(StateSpec::new().init(1));
    let _s = log_changes(&m, "a");
    m.set("a", 2).unwrap();
    cr.verify("a 1 -> 2");
}

#[test]
fn set_same_value_is_noop() {
    let mut cr = CallRecorder::new();
    let m = single(StateSpec::new().init(1));
    let _s = log_changes(&m, "a");
    m.set("a", 1).unwrap();
    cr.verify(());
}

#[test]
fn validation_rejects_silently() {
    let mut cr = CallRecorder::new();
    let m = single(StateSpec::new().init(1).validate(|_, v| *v >= 0));
    let _s = log_changes(&m, "a");

    m.set("a", -1).unwrap();
    cr.verify(());
    assert_eq!(m.get("a").unwrap(), 1);

    m.set("a", 3).unwrap();
    cr.verify("a 1 -> 3");
}

#[test]
fn transform_result_is_compared() {
    let mut cr = CallRecorder::new();
    let m = single(
        StateSpec::new()
            .init(10)
            .transform(|_, v: i32| v.min(10).into()),
    );
    let _s = log_changes(&m, "a");

    m.set("a", 15).unwrap();
    cr.verify(());
    m.set("a", 7).unwrap();
    cr.verify("a 10 -> 7");
}

#[test]
fn validate_runs_before_transform() {
    let mut cr = CallRecorder::new();
    let m = single(
        StateSpec::new()
            .init(0)
            .validate(|_, v| *v <= 1)
            .transform(|_, v: i32| (v + 1).into()),
    );
    let _s = log_changes(&m, "a");

    m.set("a", m.get("a").unwrap() + 1).unwrap();
    m.set("a", m.get("a").unwrap() + 1).unwrap();
    cr.verify("a 0 -> 2");
    assert_eq!(m.get("a").unwrap(), 2);
}

#[test]
fn transform_can_force_change() {
    let mut cr = CallRecorder::new();
    let m = single(StateSpec::new().init(1).transform(|_, v: i32| {
        if v < 0 {
            Assign::force_change()
        } else {
            v.into()
        }
    }));
    let _s = log_changes(&m, "a");

    m.set("a", -5).unwrap();
    cr.verify("a 1 -> 1");
    assert_eq!(m.get("a").unwrap(), 1);
}

#[test]
fn transform_returning_recompute_is_invalid() {
    let m = single(StateSpec::new().transform(|_, _| Assign::recompute()));
    assert!(m.set("a", 1).unwrap_err().is_invalid_mutation());
}

#[test]
fn getter_maps_reads() {
    let m = single(StateSpec::new().init(3).getter(|_, v| v * 2));
    assert_eq!(m.get("a").unwrap(), 6);
    m.set("a", 4).unwrap();
    assert_eq!(m.get("a").unwrap(), 8);
}

#[test]
fn force_change_notifies_without_changing() {
    let mut cr = CallRecorder::new();
    let m = single(StateSpec::new().init(1));
    let _s = log_changes(&m, "a");
    m.force_change("a").unwrap();
    cr.verify("a 1 -> 1");
    assert_eq!(m.get("a").unwrap(), 1);
}

#[test]
fn recompute_state_is_invalid() {
    let m = single(StateSpec::new());
    assert!(m.recompute("a").unwrap_err().is_invalid_mutation());
}

#[test]
fn subscriber_can_replace_new_value() {
    let m = single(StateSpec::new().init(1));
    let _s = m.on_change("a", |c| c.new_value *= 100).unwrap();
    m.set("a", 2).unwrap();
    assert_eq!(m.get("a").unwrap(), 200);
}

#[test]
fn prevented_change_is_not_stored() {
    let mut cr = CallRecorder::new();
    let m = single(StateSpec::new().init(1));
    let _s0 = m.on("aChange", |e| e.prevent()).unwrap();
    let _s1 = m.after("aChange", |_| call!("after")).unwrap();

    m.set("a", 2).unwrap();
    assert_eq!(m.get("a").unwrap(), 1);
    cr.verify(());
}

#[test]
fn stopped_change_skips_later_subscribers() {
    let mut cr = CallRecorder::new();
    let m = single(StateSpec::new().init(1));
    let _s0 = m.on("aChange", |e| e.stop()).unwrap();
    let _s1 = log_changes(&m, "a");

    m.set("a", 2).unwrap();
    assert_eq!(m.get("a").unwrap(), 1);
    cr.verify(());
}

#[test]
fn after_subscriber_runs_after_store() {
    let mut cr = CallRecorder::new();
    let m = single(StateSpec::new().init(1));
    let m0 = m.clone();
    let _s = m
        .after("aChange", move |_| call!("{}", m0.get("a").unwrap()))
        .unwrap();
    m.set("a", 5).unwrap();
    cr.verify("5");
}

#[test]
fn unsubscribe_on_drop() {
    let mut cr = CallRecorder::new();
    let m = single(StateSpec::new().init(1));
    let s = log_changes(&m, "a");
    drop(s);
    m.set("a", 2).unwrap();
    cr.verify(());
}

#[test]
#[should_panic(expected = "boom")]
fn subscriber_panic_propagates() {
    let m = single(StateSpec::new().init(1));
    let _s = m.on_change("a", |_| panic!("boom")).unwrap();
    let _ = m.set("a", 2);
}

#[test]
fn set_once_seals_after_first_change() {
    let mut cr = CallRecorder::new();
    let m = single(StateSpec::new().read_only(ReadOnly::SetOnce));
    let _s = log_changes(&m, "a");

    m.set("a", 5).unwrap();
    cr.verify("a 0 -> 5");
    m.set("a", 6).unwrap();
    cr.verify(());
    assert_eq!(m.get("a").unwrap(), 5);
}

#[test]
fn set_once_throw_after_seal() {
    let m = single(
        StateSpec::new()
            .read_only(ReadOnly::SetOnce)
            .read_only_set_behavior(ReadOnlySetBehavior::Throw),
    );
    m.set("a", 5).unwrap();
    assert!(matches!(
        m.set("a", 6),
        Err(Error::InvalidMutation { property, .. }) if property == "a"
    ));
    assert_eq!(m.get("a").unwrap(), 5);
}

#[test]
fn set_once_stays_open_while_prevented() {
    let m = single(StateSpec::new().read_only(ReadOnly::SetOnce));
    let s = m.on("aChange", |e| e.prevent()).unwrap();
    m.set("a", 5).unwrap();
    assert_eq!(m.get("a").unwrap(), 0);

    drop(s);
    m.set("a", 6).unwrap();
    m.set("a", 7).unwrap();
    assert_eq!(m.get("a").unwrap(), 6);
}

#[test]
fn set_once_sealed_when_dependent_fails() {
    let ty = ModelSpec::new()
        .state(
            "x",
            StateSpec::new()
                .read_only(ReadOnly::SetOnce)
                .read_only_set_behavior(ReadOnlySetBehavior::Throw),
        )
        .computed(
            "c",
            ComputedSpec::new(|m: &Model<i32>| {
                let x = m.get("x")?;
                if x == 1 {
                    return Err("rejected".into());
                }
                Ok(x.into())
            }),
        )
        .build()
        .unwrap();
    let m = Model::new(&ty, ModelConfig::new()).unwrap();

    assert!(matches!(
        m.set("x", 1),
        Err(Error::ComputationFailure { property, .. }) if property == "c"
    ));
    assert_eq!(m.get("x").unwrap(), 1);
    assert!(m.set("x", 2).unwrap_err().is_invalid_mutation());
    assert_eq!(m.get("x").unwrap(), 1);
}

#[test]
fn set_once_rejects_force_change_after_seal() {
    let mut cr = CallRecorder::new();
    let m = single(StateSpec::new().read_only(ReadOnly::SetOnce));
    let _s = log_changes(&m, "a");
    m.set("a", 1).unwrap();
    cr.verify("a 0 -> 1");
    m.force_change("a").unwrap();
    cr.verify(());
}

#[test]
fn read_only_ignore() {
    let m = single(StateSpec::new().init(1).read_only(ReadOnly::ReadOnly));
    m.set("a", 2).unwrap();
    assert_eq!(m.get("a").unwrap(), 1);
}

#[test]
fn read_only_throw() {
    let m = single(
        StateSpec::new()
            .init(1)
            .read_only(ReadOnly::ReadOnly)
            .read_only_set_behavior(ReadOnlySetBehavior::Throw),
    );
    assert!(m.set("a", 2).unwrap_err().is_invalid_mutation());
    assert_eq!(m.get("a").unwrap(), 1);
}

#[test]
fn read_only_event() {
    let mut cr = CallRecorder::new();
    let m = single(
        StateSpec::new()
            .init(1)
            .read_only(ReadOnly::ReadOnly)
            .read_only_set_behavior(ReadOnlySetBehavior::Event),
    );
    let _s = m
        .on("aReadOnlySet", |e| {
            let set = e.data.read_only_set().unwrap();
            call!(
                "{} {:?} {}",
                set.property,
                set.attempted_value,
                set.old_value
            );
        })
        .unwrap();

    m.set("a", 2).unwrap();
    cr.verify("a Value(2) 1");
    assert_eq!(m.get("a").unwrap(), 1);
}

#[test]
fn complete_hook_override_can_delegate() {
    let mut cr = CallRecorder::new();
    let m = single(StateSpec::new().init(1).on_complete(|m, c| {
        call!("complete {}", c.new_value);
        m.complete_state_change(c)
    }));
    m.set("a", 2).unwrap();
    cr.verify("complete 2");
    assert_eq!(m.get("a").unwrap(), 2);
}

#[test]
fn complete_hook_override_can_skip_store() {
    let m = single(StateSpec::new().init(1).on_complete(|_, _| Ok(())));
    m.set("a", 2).unwrap();
    assert_eq!(m.get("a").unwrap(), 1);
}

#[test]
fn unknown_property() {
    let m = single(StateSpec::new());
    assert!(matches!(
        m.get("b"),
        Err(Error::UnknownProperty { property }) if property == "b"
    ));
    assert!(matches!(m.set("b", 1), Err(Error::UnknownProperty { .. })));
}

#[test]
fn subscription_denied() {
    let m = single(StateSpec::new().allow_public_subscription(false));
    assert!(matches!(
        m.on_change("a", |_| {}),
        Err(Error::SubscriptionDenied { event }) if event == "aChange"
    ));
}

#[test]
fn unsubscription_denied_keeps_subscriber() {
    let mut cr = CallRecorder::new();
    let m = single(StateSpec::new().allow_public_unsubscription(false));
    drop(log_changes(&m, "a"));
    m.set("a", 1).unwrap();
    cr.verify("a 0 -> 1");
}

#[test]
fn custom_change_event_name() {
    let mut cr = CallRecorder::new();
    let m = single(StateSpec::new().change_event_name("aUpdated"));
    let _s = m.on("aUpdated", |e| call!("{}", e.name())).unwrap();
    m.set("a", 1).unwrap();
    cr.verify("aUpdated");
}

#[test]
fn destroy_blocks_writes_and_detaches_subscribers() {
    let mut cr = CallRecorder::new();
    let m = single(StateSpec::new().init(1));
    let _s = log_changes(&m, "a");
    m.destroy();

    assert!(m.is_destroyed());
    assert!(matches!(m.set("a", 2), Err(Error::Destroyed)));
    assert_eq!(m.get("a").unwrap(), 1);
    cr.verify(());
}

#[test]
fn models_of_one_type_are_independent() {
    let ty: ModelType<i32> = ModelSpec::new()
        .state("a", StateSpec::new().init(1))
        .build()
        .unwrap();
    let m0 = ty.create(ModelConfig::new()).unwrap();
    let m1 = ty.create(ModelConfig::new()).unwrap();
    m0.set("a", 2).unwrap();
    assert_eq!(m0.get("a").unwrap(), 2);
    assert_eq!(m1.get("a").unwrap(), 1);
}
