// End-to-end generation scenarios

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use module_types::{AbiMismatch, AbiToken, ConfigBlock, CycleError, HookError, ModuleCategory};

use crate::{
    BuiltinModules, CoreContext, Cycle, CycleBuilder, LoadRequest, ModuleDescriptor, ModuleRef,
    ScopedContext, build_generation,
};

fn http(name: &str) -> ModuleRef {
    Arc::new(ModuleDescriptor::http(name, ScopedContext::new()))
}

fn xyz() -> BuiltinModules {
    BuiltinModules::bootstrap(vec![
        ModuleDescriptor::core("x", CoreContext::new()),
        ModuleDescriptor::http("y", ScopedContext::new()),
        ModuleDescriptor::http("z", ScopedContext::new()),
    ])
    .unwrap()
}

fn names(cycle: &Cycle) -> Vec<&str> {
    cycle.modules().iter().map(|m| m.name()).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_scenario_a_append() {
    let builtins = xyz();
    let mut builder = CycleBuilder::new(&builtins, None).unwrap();

    let w = http("w");
    assert_eq!(builder.admit::<&str>(w.clone(), &[]).unwrap(), 3);
    assert_eq!(w.global_index(), Some(3));
    assert_eq!(names(builder.cycle()), vec!["x", "y", "z", "w"]);
}

#[test]
fn test_scenario_b_before() {
    let builtins = xyz();
    let mut builder = CycleBuilder::new(&builtins, None).unwrap();

    assert_eq!(builder.admit(http("w"), &["y"]).unwrap(), 1);
    assert_eq!(names(builder.cycle()), vec!["x", "w", "y", "z"]);
    assert_eq!(builder.cycle().position("y"), Some(2));
    assert_eq!(builder.cycle().position("z"), Some(3));
}

#[test]
fn test_scenario_c_count_seals_category() {
    let builtins = xyz();
    let extra = http("extra");
    let mut builder = CycleBuilder::new(&builtins, None).unwrap();
    builder.admit::<&str>(extra, &[]).unwrap();
    assert_eq!(builder.count_and_assign(ModuleCategory::Http).unwrap(), 3);

    // a later generation sees all three slots as preassigned
    let previous = builder.finish();
    let mut builder = CycleBuilder::new(&builtins, Some(&previous)).unwrap();
    builder
        .admit::<&str>(previous.module("extra").unwrap().clone(), &[])
        .unwrap();

    assert_eq!(builder.count_and_assign(ModuleCategory::Http).unwrap(), 3);
    assert!(builder.cycle().is_sealed(ModuleCategory::Http));
    assert!(matches!(
        builder.admit::<&str>(http("late"), &[]),
        Err(CycleError::CategorySealed { .. })
    ));
    assert!(builder.cycle().module("late").is_none());
}

#[test]
fn test_scenario_d_core_conf_failure() {
    let builtins = xyz();
    let mut builder = CycleBuilder::new(&builtins, None).unwrap();
    let broken = Arc::new(ModuleDescriptor::core(
        "broken",
        CoreContext::new().with_create_conf(|_| Err(HookError::new("out of memory"))),
    ));

    let err = builder.admit::<&str>(broken, &[]).unwrap_err();
    assert_eq!(
        err,
        CycleError::ConfigCreationFailed {
            module: "broken".to_string(),
            category: ModuleCategory::Core,
            reason: "out of memory".to_string(),
        }
    );
    assert!(builder.cycle().module("broken").is_none());
    assert_eq!(builder.cycle().len(), 3);
}

// ─────────────────────────────────────────────────────────────────────────────
// Properties
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_global_indices_unique_and_bounded() {
    let builtins = BuiltinModules::bootstrap_with_budget(
        vec![ModuleDescriptor::core("core", CoreContext::new())],
        12,
    )
    .unwrap();
    let catalog: Vec<ModuleRef> = (0..12).map(|i| http(&format!("mod_{}", i))).collect();

    // each generation drops a different third of the catalog
    let mut previous: Option<Cycle> = None;
    for generation in 0..4 {
        let requests: Vec<LoadRequest> = (0..12)
            .filter(|i| (i + generation) % 3 != 0)
            .map(|i| LoadRequest::new(catalog[i].clone()).before([format!("mod_{}", i / 2)]))
            .collect();

        let cycle = build_generation(&builtins, previous.as_ref(), requests).unwrap();
        let indices: Vec<usize> = cycle.modules().iter().filter_map(|m| m.global_index()).collect();
        assert_eq!(indices.len(), cycle.len());
        assert_eq!(indices.iter().collect::<HashSet<_>>().len(), indices.len());
        assert!(indices.iter().all(|&i| i < cycle.max_modules()));
        previous = Some(cycle);
    }
}

#[test]
fn test_category_slots_pairwise_distinct() {
    let builtins = xyz();
    let first = build_generation(
        &builtins,
        None,
        ["a", "b", "c"].map(|n| LoadRequest::new(http(n))),
    )
    .unwrap();

    // keep "b", drop the rest, add two new modules
    let requests = vec![
        LoadRequest::new(http("d")),
        LoadRequest::new(first.module("b").unwrap().clone()),
        LoadRequest::new(http("e")),
    ];
    let second = build_generation(&builtins, Some(&first), requests).unwrap();

    for cycle in [&first, &second] {
        for category in ModuleCategory::ALL {
            let slots: Vec<usize> = cycle.modules_of(category).filter_map(|m| m.category_slot()).collect();
            assert_eq!(slots.iter().collect::<HashSet<_>>().len(), slots.len());
        }
    }
    assert_eq!(
        second.module("b").unwrap().category_slot(),
        first.module("b").unwrap().category_slot()
    );
}

#[test]
fn test_slot_count_covers_previous_maximum() {
    let builtins = BuiltinModules::bootstrap(vec![]).unwrap();
    let first = build_generation(
        &builtins,
        None,
        (0..6).map(|i| LoadRequest::new(http(&format!("h{}", i)))),
    )
    .unwrap();
    assert_eq!(first.slot_count(ModuleCategory::Http), Some(6));

    let second = build_generation(&builtins, Some(&first), vec![LoadRequest::new(http("only"))]).unwrap();
    assert!(second.slot_count(ModuleCategory::Http).unwrap() >= 6);
}

#[test]
fn test_before_survives_later_admissions() {
    let builtins = xyz();
    let mut builder = CycleBuilder::new(&builtins, None).unwrap();
    builder.admit(http("a"), &["z"]).unwrap();

    for i in 0..20 {
        let name = format!("unrelated_{}", i);
        let before: &[&str] = if i % 2 == 0 { &["x"] } else { &[] };
        builder.admit(http(&name), before).unwrap();
        assert!(builder.cycle().position("a").unwrap() < builder.cycle().position("z").unwrap());
    }
}

#[test]
fn test_capacity_boundary() {
    let builtins = BuiltinModules::bootstrap_with_budget(
        vec![ModuleDescriptor::core("core", CoreContext::new())],
        3,
    )
    .unwrap();
    let mut builder = CycleBuilder::new(&builtins, None).unwrap();

    for i in 0..3 {
        builder.admit::<&str>(http(&format!("m{}", i)), &[]).unwrap();
    }
    assert_eq!(builder.cycle().len(), builtins.max_modules());

    let err = builder.admit::<&str>(http("one_too_many"), &[]).unwrap_err();
    assert_eq!(
        err,
        CycleError::CapacityExceeded {
            module: "one_too_many".to_string(),
            max_modules: 4,
        }
    );
}

#[test]
fn test_index_capacity_counts_previous_generation() {
    let builtins = BuiltinModules::bootstrap_with_budget(
        vec![ModuleDescriptor::core("core", CoreContext::new())],
        2,
    )
    .unwrap();
    let a = http("a");
    let first = build_generation(
        &builtins,
        None,
        vec![LoadRequest::new(a.clone()), LoadRequest::new(http("b"))],
    )
    .unwrap();

    // swapping "b" for "c" at full budget finds no index outside both generations
    let mut builder = CycleBuilder::new(&builtins, Some(&first)).unwrap();
    builder.admit::<&str>(a, &[]).unwrap();
    let c = http("c");
    let err = builder.admit::<&str>(c.clone(), &[]).unwrap_err();

    assert_eq!(
        err,
        CycleError::CapacityExceeded {
            module: "c".to_string(),
            max_modules: 3,
        }
    );
    assert!(builder.cycle().len() < builtins.max_modules());
    assert_eq!(c.global_index(), None);
}

#[test]
fn test_reused_descriptor_cannot_share_index() {
    let builtins = xyz();
    let w = http("w");
    let first = build_generation(&builtins, None, vec![LoadRequest::new(w.clone())]).unwrap();
    assert_eq!(w.global_index(), Some(3));

    // the next generation drops "w", so index 3 is free again one generation later
    let second = build_generation(&builtins, Some(&first), vec![LoadRequest::new(http("v"))]).unwrap();
    assert_eq!(second.module("v").unwrap().global_index(), Some(4));

    let u = http("u");
    let err = build_generation(
        &builtins,
        Some(&second),
        vec![LoadRequest::new(u.clone()), LoadRequest::new(w.clone())],
    )
    .unwrap_err();
    assert_eq!(u.global_index(), Some(3));
    assert_eq!(
        err,
        CycleError::IndexInUse {
            module: "w".to_string(),
            holder: "u".to_string(),
            index: 3,
        }
    );

    // admitted first, "w" keeps its index and the fresh module goes past it
    let third = build_generation(
        &builtins,
        Some(&second),
        vec![LoadRequest::new(w.clone()), LoadRequest::new(http("t"))],
    )
    .unwrap();
    let indices: Vec<usize> = third.modules().iter().filter_map(|m| m.global_index()).collect();
    assert_eq!(indices.iter().collect::<HashSet<_>>().len(), third.len());
    assert_eq!(third.module("w").unwrap().global_index(), Some(3));
    assert_eq!(third.module("t").unwrap().global_index(), Some(5));
}

#[test]
fn test_reused_descriptors_cannot_share_slot() {
    let builtins = xyz();
    let p = http("p");
    p.assign_global_index(10);
    p.assign_category_slot(5);
    let q = http("q");
    q.assign_global_index(11);
    q.assign_category_slot(5);

    let err = build_generation(&builtins, None, vec![LoadRequest::new(p), LoadRequest::new(q)]).unwrap_err();
    assert_eq!(
        err,
        CycleError::SlotInUse {
            module: "q".to_string(),
            holder: "p".to_string(),
            category: ModuleCategory::Http,
            slot: 5,
        }
    );
}

#[test]
fn test_duplicate_name_with_foreign_abi_reports_abi() {
    let builtins = xyz();
    let mut builder = CycleBuilder::new(&builtins, None).unwrap();
    builder.admit::<&str>(http("w"), &[]).unwrap();

    let foreign_version = builtins.abi().version + 1;
    let foreign = Arc::new(
        ModuleDescriptor::http("w", ScopedContext::new())
            .with_abi(AbiToken::new(foreign_version, "elsewhere")),
    );
    let err = builder.admit::<&str>(foreign, &[]).unwrap_err();

    assert_eq!(
        err,
        CycleError::AbiMismatch {
            module: "w".to_string(),
            mismatch: AbiMismatch::Version {
                expected: builtins.abi().version,
                found: foreign_version,
            },
        }
    );
    assert_eq!(builder.cycle().len(), 4);
}

#[test]
fn test_duplicate_name_leaves_table_unchanged() {
    let builtins = xyz();
    let mut builder = CycleBuilder::new(&builtins, None).unwrap();
    builder.admit(http("w"), &["z"]).unwrap();
    let before = names(builder.cycle()).into_iter().map(String::from).collect::<Vec<_>>();

    let other = Arc::new(ModuleDescriptor::core("w", CoreContext::new()));
    let err = builder.admit(other, &["x"]).unwrap_err();

    assert_eq!(
        err,
        CycleError::DuplicateName {
            module: "w".to_string()
        }
    );
    assert_eq!(names(builder.cycle()), before);
}

// ─────────────────────────────────────────────────────────────────────────────
// Init Hooks
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_init_hooks_run_in_order_and_stop_at_failure() {
    let calls = Arc::new(AtomicUsize::new(0));
    let hook = |fail: bool| {
        let calls = calls.clone();
        move |_: &Cycle| {
            calls.fetch_add(1, Ordering::SeqCst);
            if fail { Err(HookError::new("init_by_script failed")) } else { Ok(()) }
        }
    };

    let builtins = BuiltinModules::bootstrap(vec![
        ModuleDescriptor::core("first", CoreContext::new()).with_init_module(hook(false)),
        ModuleDescriptor::http("second", ScopedContext::new()).with_init_module(hook(true)),
        ModuleDescriptor::http("third", ScopedContext::new()).with_init_module(hook(false)),
    ])
    .unwrap();

    let err = build_generation(&builtins, None, Vec::new()).unwrap_err();
    assert_eq!(
        err,
        CycleError::InitHookFailed {
            module: "second".to_string(),
            reason: "init_by_script failed".to_string(),
        }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_hooks_read_configs_of_the_generation() {
    #[derive(Debug)]
    struct EventsConf {
        connections: usize,
    }

    let builtins = BuiltinModules::bootstrap(vec![
        ModuleDescriptor::core(
            "events",
            CoreContext::new().with_create_conf(|_| Ok(ConfigBlock::new(EventsConf { connections: 512 }))),
        ),
        ModuleDescriptor::event(
            "epoll",
            ScopedContext::new().with_create_main_conf(|cycle| {
                let events = cycle
                    .module_conf::<EventsConf>("events")
                    .map_err(|e| HookError::new(e.to_string()))?;
                Ok(ConfigBlock::new(events.connections * 2))
            }),
        ),
    ])
    .unwrap();

    let cycle = build_generation(&builtins, None, Vec::new()).unwrap();
    let slot = cycle.module("epoll").unwrap().category_slot().unwrap();
    let block = cycle.get_config(ModuleCategory::Event, slot).unwrap();
    assert_eq!(block.downcast_ref::<usize>(), Some(&1024));

    let index = cycle.module("events").unwrap().global_index().unwrap();
    assert!(cycle.get_core_config(index).unwrap().is::<EventsConf>());
    assert_eq!(
        cycle.get_config(ModuleCategory::Mail, 0).unwrap_err(),
        CycleError::SlotNotPopulated {
            category: ModuleCategory::Mail,
            slot: 0,
        }
    );
}
