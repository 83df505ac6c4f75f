use super::*;
use assert_call::{call, CallRecorder};

#[test]
fn task_runs_on_update() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    Task::new(|| call!("task")).schedule();
    cr.verify(());
    rt.update();
    cr.verify("task");
}

#[test]
fn tasks_scheduled_by_tasks_run_in_same_update() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    Task::new(|| {
        call!("a");
        Task::new(|| call!("b")).schedule();
    })
    .schedule();
    rt.update();
    cr.verify(["a", "b"]);
}

#[test]
fn weak_task_skipped_when_dropped() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let rc = Rc::new(5);
    Task::from_weak_fn(Rc::downgrade(&rc), |x| call!("{x}")).schedule();
    drop(rc);
    rt.update();
    cr.verify(());
}

#[test]
fn weak_task_runs_when_alive() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    let rc = Rc::new(5);
    Task::from_weak_fn(Rc::downgrade(&rc), |x| call!("{x}")).schedule();
    rt.update();
    cr.verify("5");
}

#[test]
fn spawn_local_runs_on_update() {
    let mut rt = Runtime::new();
    let mut cr = CallRecorder::new();
    spawn_local(async {
        call!("a");
        futures::future::ready(()).await;
        Task::new(|| call!("b")).schedule();
    });
    cr.verify(());
    rt.update();
    cr.verify(["a", "b"]);
}

#[test]
fn pending_work_is_dropped_with_runtime() {
    let mut cr = CallRecorder::new();
    {
        let _rt = Runtime::new();
        Task::new(|| call!("never")).schedule();
    }
    let mut rt = Runtime::new();
    rt.update();
    cr.verify(());
}

#[test]
fn task_without_runtime_is_dropped() {
    let mut cr = CallRecorder::new();
    Task::new(|| call!("never")).schedule();
    let mut rt = Runtime::new();
    rt.update();
    cr.verify(());
}

#[test]
#[should_panic]
fn second_runtime_panics() {
    let _rt0 = Runtime::new();
    let _rt1 = Runtime::new();
}
