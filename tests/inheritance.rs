use assert_call::{call, CallRecorder};
use propflow::{ComputedSpec, Model, ModelConfig, ModelSpec, ModelType, StateSpec};

type M = Model<i32>;

fn base() -> ModelType<i32> {
    ModelSpec::new()
        .state("a", StateSpec::new().init(1))
        .computed(
            "double",
            ComputedSpec::new(|m: &M| Ok((m.get("a")? * 2).into())),
        )
        .build()
        .unwrap()
}

#[test]
fn derived_type_adds_properties() {
    let base = base();
    let derived = base
        .extend()
        .state("b", StateSpec::new().init(10))
        .computed(
            "total",
            ComputedSpec::new(|m: &M| Ok((m.get("double")? + m.get("b")?).into())),
        )
        .build()
        .unwrap();

    let m = derived.create(ModelConfig::new()).unwrap();
    assert_eq!(m.get("total").unwrap(), 12);
    m.set("a", 2).unwrap();
    assert_eq!(m.get("total").unwrap(), 14);

    let m = base.create(ModelConfig::new()).unwrap();
    assert!(m.get("total").is_err());
}

#[test]
fn derived_type_overrides_computed() {
    let derived = base()
        .extend()
        .computed(
            "double",
            ComputedSpec::new(|m: &M| Ok((m.get("a")? + m.get("a")?).into())).lazy(),
        )
        .build()
        .unwrap();
    assert_eq!(derived.computeds().len(), 1);

    let m = derived.create(ModelConfig::new()).unwrap();
    assert!(m.is_stale("double").unwrap());
    assert_eq!(m.get("double").unwrap(), 2);
}

#[test]
fn derived_type_overrides_initial_value() {
    let derived = base()
        .extend()
        .state("a", StateSpec::new().init(5))
        .build()
        .unwrap();
    let m = derived.create(ModelConfig::new()).unwrap();
    assert_eq!(m.get("double").unwrap(), 10);
}

#[test]
fn derived_type_overrides_completion_hook() {
    let mut cr = CallRecorder::new();
    let derived = base()
        .extend()
        .state(
            "a",
            StateSpec::new().init(1).on_complete(|m, c| {
                call!("a {} -> {}", c.old_value, c.new_value);
                m.complete_state_change(c)
            }),
        )
        .build()
        .unwrap();
    let m = derived.create(ModelConfig::new()).unwrap();

    m.set("a", 3).unwrap();
    cr.verify("a 1 -> 3");
    assert_eq!(m.get("double").unwrap(), 6);
}
