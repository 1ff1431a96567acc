// Copyright (c) The Ravel Authors.
// Licensed under the MIT License.

//! A root request spawns a hundred children, submits them all, then sums
//! their results back up sequentially.

use ravel::{Error, Request, WorkerPool, WorkerPoolConfig};

#[test]
fn root_sums_one_hundred_children() {
    let pool = WorkerPool::new(WorkerPoolConfig::builder(4).build());
    let root: Request<u32> = Request::new_in(&pool, move || {
        let children: Vec<_> = (1..=100u32)
            .map(|n| Request::new(move || Ok::<u32, Error>(n)))
            .collect();
        for child in &children {
            child.submit()?;
        }
        let mut total = 0u32;
        for child in &children {
            total += *child.wait(None)?;
        }
        Ok(total)
    });
    root.submit().expect("submit root");
    let total = *root.wait(None).expect("root completes");
    assert_eq!(total, 4950);
}

#[test]
fn children_are_priority_ordered_strictly_after_their_parent() {
    let pool = WorkerPool::new(WorkerPoolConfig::builder(2).build());
    let root: Request<bool> = Request::new_in(&pool, move || {
        let a = Request::new(|| Ok::<u32, Error>(1));
        let b = Request::new(|| Ok::<u32, Error>(2));
        a.submit()?;
        b.submit()?;
        a.wait(None)?;
        b.wait(None)?;
        Ok(true)
    });
    root.submit().expect("submit");
    assert!(*root.wait(None).expect("root completes"));
}
