// Copyright (c) 2026 xmpp-im contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A timer source firing once per configurable window.
//!
//! Wake-ups are randomized inside the window so that many clients sharing
//! a machine (or a mobile baseband) don't all hit the radio at the same
//! instant. The first wake-up is drawn from `[0, max)` instead of
//! `[min, max]` to fall into step with connections that started waiting
//! at slightly different times.

use std::time::Duration;

use log::{debug, warn};
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    min: u64,
    max: u64,
}

/// A repeating timer owned by its creator and detached from the event
/// loop on drop.
///
/// Must be created from within a `tokio::task::LocalSet`, like the rest
/// of this crate's event-loop machinery.
pub struct HeartbeatSource {
    window: watch::Sender<Window>,
    task: JoinHandle<()>,
}

impl HeartbeatSource {
    /// Spawns the timer. `callback` runs once per window, on the event
    /// loop. `max_interval == 0` keeps the source quiet until it is
    /// re-armed with [`HeartbeatSource::update_interval`].
    pub fn new(min_interval: u64, max_interval: u64, callback: Box<dyn Fn()>) -> HeartbeatSource {
        let (tx, rx) = watch::channel(Window {
            min: min_interval,
            max: max_interval,
        });
        let task = tokio::task::spawn_local(run(rx, callback));
        HeartbeatSource { window: tx, task }
    }

    /// Changes the window used for subsequent wake-ups.
    pub fn update_interval(&self, min_interval: u64, max_interval: u64) {
        let window = Window {
            min: min_interval,
            max: max_interval,
        };
        if self.window.send(window).is_err() {
            warn!("heartbeat task is gone; interval update dropped");
        }
    }
}

impl Drop for HeartbeatSource {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(mut window: watch::Receiver<Window>, callback: Box<dyn Fn()>) {
    let mut wait = initial_wait(window.borrow().max);
    loop {
        match wait {
            Some(duration) => {
                tokio::select! {
                    _ = time::sleep(duration) => {
                        debug!("heartbeat fired");
                        callback();
                        let Window { min, max } = *window.borrow();
                        wait = next_wait(min, max);
                    }
                    changed = window.changed() => {
                        if changed.is_err() {
                            warn!("heartbeat window channel closed unexpectedly");
                            return;
                        }
                        let Window { min, max } = *window.borrow();
                        wait = next_wait(min, max);
                    }
                }
            }
            // Disabled: sit idle until the window changes.
            None => match window.changed().await {
                Ok(()) => {
                    wait = initial_wait(window.borrow().max);
                }
                Err(_) => {
                    warn!("heartbeat window channel closed unexpectedly");
                    return;
                }
            },
        }
    }
}

fn initial_wait(max: u64) -> Option<Duration> {
    if max == 0 {
        return None;
    }
    Some(Duration::from_secs(rand::thread_rng().gen_range(0..max)))
}

fn next_wait(min: u64, max: u64) -> Option<Duration> {
    if max == 0 {
        return None;
    }
    let max = max.max(min);
    Some(Duration::from_secs(rand::thread_rng().gen_range(min..=max)))
}
