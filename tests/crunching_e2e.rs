mod common;

use std::sync::Arc;

use common::{drain, AccumulatorPack, Counter, CounterPack, FailingPack, WalkPack};
use forkline::{
    Clock, CrunchError, CrunchTarget, ForklineError, JobFailure, JobStatus, Project, ProjectConfig, StepArgs,
    StepError, TreeMember, SEED_ARG,
};

#[test]
fn synchronous_simulation_is_monotonic() {
    let project = Project::new(CounterPack);
    let start = Arc::new(Counter::zero());

    let mut previous = Clock::ZERO;
    for steps in 0..5 {
        let state = project.simulate(Arc::clone(&start), steps).unwrap();
        let clock = Clock::from(state.clock);
        assert!(clock >= previous);
        previous = clock;
    }

    let chain = project.list_simulate(Arc::clone(&start), 4).unwrap();
    assert_eq!(chain.len(), 5);
    assert!(Arc::ptr_eq(&chain[0], &start));

    let mut iter = project.iter_simulate(start, 4);
    assert_eq!(iter.by_ref().count(), 5);
    assert!(iter.next().is_none());
}

#[test]
fn crunching_grows_then_forks() {
    let mut project = Project::new(CounterPack);
    let root = project.root_this_state(Counter::zero()).unwrap();

    project.begin_crunching(root, CrunchTarget::Clock(Clock::new(4.0))).unwrap();
    assert_eq!(drain(&mut project), 4);

    let node_1 = {
        let tree = project.tree().read().unwrap();
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.roots().len(), 1);
        let paths = tree.all_possible_paths();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].len(), 5);
        let node_1 = paths[0][1];
        assert_eq!(tree.node(node_1).unwrap().clock(), Clock::new(1.0));
        node_1
    };

    project.begin_crunching(node_1, CrunchTarget::Steps(3)).unwrap();
    assert_eq!(drain(&mut project), 3);

    let tree = project.tree().read().unwrap();
    assert_eq!(tree.len(), 8);
    assert_eq!(tree.roots().len(), 1);
    let paths = tree.all_possible_paths();
    assert_eq!(paths.len(), 2);
    assert_eq!(paths[0].len(), 5);
    assert_eq!(paths[1].len(), 5);
    assert_eq!(paths[0].common_prefix_len(&paths[1]), 2);

    let fork = tree.node(node_1).unwrap();
    assert!(fork.is_fork());
    assert_eq!(fork.soft_get_block(), None);
    let children = fork.children();
    let first_block = tree.soft_get_block(children[0]).unwrap().unwrap();
    let second_block = tree.soft_get_block(children[1]).unwrap().unwrap();
    assert_ne!(first_block, second_block);
    for block in [first_block, second_block] {
        let block = tree.block(block).unwrap();
        assert!(!block.contains(node_1));
        assert_eq!(block.len(), 3);
    }

    let members: Vec<TreeMember> = tree.iterate_tree_members(false).collect();
    assert!(members.contains(&TreeMember::Block(first_block)));
    assert!(members.contains(&TreeMember::Block(second_block)));

    let full: Vec<TreeMember> = tree.iterate_tree_members(true).collect();
    assert!(members.iter().all(|m| full.contains(m)));
    for extra in full.iter().filter(|m| !members.contains(m)) {
        let TreeMember::Node(id) = extra else {
            panic!("only nodes may be added by include_blockful_nodes, got {extra:?}");
        };
        assert!(tree.node(*id).unwrap().soft_get_block().is_some());
    }
}

#[test]
fn sync_without_output_is_idempotent() {
    let mut project = Project::new(CounterPack);
    let root = project.root_this_state(Counter::zero()).unwrap();
    project.begin_crunching(root, CrunchTarget::Steps(2)).unwrap();
    drain(&mut project);

    let before = project.tree().read().unwrap().len();
    assert_eq!(project.sync_crunchers().unwrap(), 0);
    assert_eq!(project.sync_crunchers().unwrap(), 0);
    assert_eq!(project.tree().read().unwrap().len(), before);
}

#[test]
fn failing_step_keeps_good_states_and_reports() {
    let mut project = Project::new(FailingPack { fail_at: 1 });
    let root = project.root_this_state(Counter::zero()).unwrap();
    let job = project.begin_crunching(root, CrunchTarget::Steps(4)).unwrap();

    assert_eq!(drain(&mut project), 1);
    assert_eq!(project.tree().read().unwrap().len(), 2);

    let finished = project.crunching_manager().job(job).unwrap();
    let JobStatus::Failed {
        failure: JobFailure::Step(StepError::Failed { function, .. }),
    } = &finished.status
    else {
        panic!("expected a step failure, got {:?}", finished.status);
    };
    assert_eq!(function, "fragile");
    assert_eq!(project.crunching_manager_mut().take_finished().len(), 1);
    assert!(project.crunching_manager().finished_jobs().is_empty());
}

#[test]
fn second_job_on_same_frontier_is_rejected() {
    let mut project = Project::new(CounterPack);
    let root = project.root_this_state(Counter::zero()).unwrap();
    let first = project.begin_crunching(root, CrunchTarget::Forever).unwrap();

    let err = project.begin_crunching(root, CrunchTarget::Steps(1)).unwrap_err();
    match err {
        ForklineError::Crunch(CrunchError::NodeAlreadyCrunched { node, job }) => {
            assert_eq!(node, root);
            assert_eq!(job, first);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(project.crunching_manager().jobs().count(), 1);

    project.cancel_job(first).unwrap();
    assert!(!project.crunching_manager().has_active_jobs());
}

#[test]
fn end_state_completes_job() {
    let mut project = Project::new(CounterPack);
    let root = project.root_this_state(Counter::ending_at(3)).unwrap();
    let job = project.begin_crunching(root, CrunchTarget::Forever).unwrap();

    assert_eq!(drain(&mut project), 3);
    assert_eq!(project.crunching_manager().job(job).unwrap().status, JobStatus::Completed);
}

#[test]
fn history_dependent_crunching_sees_recorded_ancestors() {
    let mut project = Project::new(AccumulatorPack);
    let root = project.root_this_state(Counter::zero()).unwrap();
    let mid = project.simulate_node(root, 2).unwrap();
    project.begin_crunching(mid, CrunchTarget::Steps(2)).unwrap();
    drain(&mut project);

    let tree = project.tree().read().unwrap();
    let path = tree.all_possible_paths().remove(0);
    let values: Vec<i64> = path.iter().map(|id| tree.node(id).unwrap().state().value).collect();
    // 0, 1, 2, 4, 8: each value is one more than the sum before it
    assert_eq!(values, vec![0, 1, 2, 4, 8]);
}

#[test]
fn seeded_random_walks_repeat() {
    let mut project = Project::new(WalkPack);
    let profile = project.build_step_profile(StepArgs::new().with(SEED_ARG, 42));
    assert!(project.determinism(&profile).unwrap().is_deterministic());
    assert!(!project.determinism(project.default_profile()).unwrap().is_deterministic());

    let a = project.root_this_state(Counter::zero()).unwrap();
    let b = project.root_this_state(Counter::zero()).unwrap();
    project
        .begin_crunching_with_profile(a, CrunchTarget::Steps(20), profile.clone())
        .unwrap();
    project.begin_crunching_with_profile(b, CrunchTarget::Steps(20), profile).unwrap();
    assert_eq!(drain(&mut project), 40);

    let tree = project.tree().read().unwrap();
    let paths = tree.all_possible_paths();
    let walk = |i: usize| -> Vec<i64> { paths[i].iter().map(|id| tree.node(id).unwrap().state().value).collect() };
    assert_eq!(walk(0), walk(1));
}

#[test]
fn small_buffers_still_deliver_everything() {
    let config = ProjectConfig::from_json_str(r#"{"crunching": {"buffer_capacity": 1, "send_poll_interval_ms": 1}}"#)
        .unwrap();
    let mut project = Project::with_config(CounterPack, config).unwrap();
    let root = project.root_this_state(Counter::zero()).unwrap();
    project.begin_crunching(root, CrunchTarget::Steps(50)).unwrap();

    assert_eq!(drain(&mut project), 50);
    let tree = project.tree().read().unwrap();
    assert_eq!(tree.len(), 51);
    assert_eq!(tree.block_count(), 1);
}
