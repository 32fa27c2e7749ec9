//! Resource-safe acquisition and uninterruptible regions.

use super::{Callback, Canceler, Done, Task};

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

/// How the `use` phase of a bracket ended, as seen by its release handler.
#[derive(Debug)]
pub enum Exit<'a, A, E> {
    /// `use` succeeded with this value.
    Completed(&'a A),
    /// `use` failed with this error.
    Failed(&'a E),
    /// The run was cancelled while acquiring or using the resource.
    Killed,
}

impl<A, E> Exit<'_, A, E> {
    pub fn is_killed(&self) -> bool {
        matches!(self, Exit::Killed)
    }
}

type Release<R, B, E> = Rc<dyn Fn(Exit<'_, B, E>, R) -> Task<(), E>>;

enum Phase<R> {
    /// Holds the acquisition's canceler once its run returned.
    Acquiring(Option<Canceler>),
    Using {
        resource: R,
        canceler: Option<Canceler>,
    },
    Releasing,
    Finished,
}

struct Bracket<R, B, E> {
    phase: Phase<R>,
    callback: Option<Callback<B, E>>,
    /// Set when cancellation arrived while the current phase cannot be
    /// interrupted; fired once that phase is over.
    killed: Option<Done>,
    release: Release<R, B, E>,
    /// Cancelling during acquisition cancels the acquisition itself.
    interruptible: bool,
}

type State<R, B, E> = Rc<RefCell<Bracket<R, B, E>>>;

impl<R: Clone + 'static, E: 'static> Task<R, E> {
    /// Acquires a resource with this task, runs `use_` on it and always runs
    /// `release` afterwards.
    pub fn bracket<B: 'static>(
        &self,
        release: impl Fn(R) -> Task<(), E> + 'static,
        use_: impl Fn(R) -> Task<B, E> + 'static,
    ) -> Task<B, E> {
        self.general_bracket(move |_exit, resource| release(resource), use_)
    }

    /// Like [`Task::bracket`], but `release` learns how `use_` ended.
    ///
    /// Acquisition and release are uninterruptible: cancelling while either
    /// is in flight waits for it to finish. Cancelling during `use_` cancels
    /// it, then runs `release` with [`Exit::Killed`]; the cancellation
    /// completes once the release has. A failing release replaces the result
    /// of `use_`.
    pub fn general_bracket<B: 'static>(
        &self,
        release: impl Fn(Exit<'_, B, E>, R) -> Task<(), E> + 'static,
        use_: impl Fn(R) -> Task<B, E> + 'static,
    ) -> Task<B, E> {
        self.bracket_with(false, Rc::new(release), Rc::new(use_))
    }

    /// Like [`Task::general_bracket`], but cancelling during acquisition
    /// cancels the acquiring task instead of waiting for it. If it never
    /// delivered a resource, neither `use_` nor `release` runs.
    ///
    /// The acquiring task must not deliver once cancelled, as is the case
    /// for a queued AVar operation.
    pub(crate) fn general_bracket_interruptible<B: 'static>(
        &self,
        release: impl Fn(Exit<'_, B, E>, R) -> Task<(), E> + 'static,
        use_: impl Fn(R) -> Task<B, E> + 'static,
    ) -> Task<B, E> {
        self.bracket_with(true, Rc::new(release), Rc::new(use_))
    }

    fn bracket_with<B: 'static>(
        &self,
        interruptible: bool,
        release: Release<R, B, E>,
        use_: Rc<dyn Fn(R) -> Task<B, E>>,
    ) -> Task<B, E> {
        let acquire = self.clone();

        Task::from_raw(move |callback| {
            let state = Rc::new(RefCell::new(Bracket {
                phase: Phase::Acquiring(None),
                callback: Some(callback),
                killed: None,
                release: release.clone(),
                interruptible,
            }));

            let st = state.clone();
            let use_ = use_.clone();
            let acquiring = acquire.run(move |acquired| {
                // the acquisition was interrupted but delivered anyway
                let interrupted = matches!(st.borrow().phase, Phase::Finished);
                match acquired {
                    Ok(resource) if interrupted => release_detached(&st, resource),
                    Err(_) if interrupted => {}
                    Ok(resource) => start_use(st, resource, &*use_),
                    Err(error) => {
                        let (callback, killed) = finish(&st);
                        match (killed, callback) {
                            (Some(done), _) => done(),
                            (None, Some(callback)) => callback(Err(error)),
                            (None, None) => {}
                        }
                    }
                }
            });
            acquire_started(&state, acquiring);

            Canceler::new(move |done| cancel(&state, done))
        })
    }
}

/// Keeps the acquisition's canceler while it is still running. An
/// interruptible bracket cancelled before this point is interrupted now.
fn acquire_started<R, B, E>(state: &RefCell<Bracket<R, B, E>>, acquiring: Canceler) {
    let interrupted = {
        let mut bracket = state.borrow_mut();
        if !matches!(bracket.phase, Phase::Acquiring(_)) {
            return;
        }
        if bracket.interruptible && bracket.killed.is_some() {
            bracket.phase = Phase::Finished;
            bracket.killed.take()
        } else {
            bracket.phase = Phase::Acquiring(Some(acquiring));
            return;
        }
    };

    acquiring.cancel(move || {
        if let Some(done) = interrupted {
            done();
        }
    });
}

fn release_detached<R, B, E>(state: &RefCell<Bracket<R, B, E>>, resource: R)
where
    R: 'static,
    B: 'static,
    E: 'static,
{
    let release = state.borrow().release.clone();
    let _ = release(Exit::Killed, resource).run(|released| {
        if released.is_err() {
            tracing::warn!("bracket release failed after an interrupted acquisition");
        }
    });
}

fn start_use<R, B, E>(state: State<R, B, E>, resource: R, use_: &dyn Fn(R) -> Task<B, E>)
where
    R: Clone + 'static,
    B: 'static,
    E: 'static,
{
    if state.borrow().killed.is_some() {
        state.borrow_mut().phase = Phase::Releasing;
        release_killed(state, resource);
        return;
    }

    state.borrow_mut().phase = Phase::Using {
        resource: resource.clone(),
        canceler: None,
    };

    let st = state.clone();
    let canceler = use_(resource).run(move |result| {
        let (resource, release) = {
            let mut bracket = st.borrow_mut();
            match mem::replace(&mut bracket.phase, Phase::Releasing) {
                Phase::Using { resource, .. } => (resource, bracket.release.clone()),
                other => {
                    bracket.phase = other;
                    return;
                }
            }
        };

        let exit = match &result {
            Ok(value) => Exit::Completed(value),
            Err(error) => Exit::Failed(error),
        };
        let release_task = release(exit, resource);

        let _ = release_task.run(move |released| {
            let (callback, killed) = finish(&st);
            match (killed, callback) {
                (Some(done), _) => {
                    if released.is_err() {
                        tracing::warn!("bracket release failed while its run was being cancelled");
                    }
                    done();
                }
                (None, Some(callback)) => callback(released.and(result)),
                (None, None) => {}
            }
        });
    });

    let orphan = {
        let mut bracket = state.borrow_mut();
        let killed = bracket.killed.is_some();
        match &mut bracket.phase {
            Phase::Using { canceler: slot, .. } => {
                *slot = Some(canceler);
                None
            }
            _ if killed => Some(canceler),
            _ => None,
        }
    };
    if let Some(orphan) = orphan {
        orphan.cancel_detached();
    }
}

fn cancel<R, B, E>(state: &State<R, B, E>, done: Done)
where
    R: 'static,
    B: 'static,
    E: 'static,
{
    let mut bracket = state.borrow_mut();
    bracket.callback = None;

    match mem::replace(&mut bracket.phase, Phase::Releasing) {
        Phase::Using { resource, canceler } => {
            bracket.killed = Some(done);
            drop(bracket);

            let st = state.clone();
            canceler
                .unwrap_or_default()
                .cancel(move || release_killed(st, resource));
        }
        Phase::Acquiring(Some(acquiring)) if bracket.interruptible => {
            bracket.phase = Phase::Finished;
            drop(bracket);
            acquiring.cancel(done);
        }
        Phase::Finished => {
            bracket.phase = Phase::Finished;
            drop(bracket);
            done();
        }
        phase @ (Phase::Acquiring(_) | Phase::Releasing) => {
            bracket.phase = phase;
            bracket.killed = Some(done);
        }
    }
}

fn release_killed<R, B, E>(state: State<R, B, E>, resource: R)
where
    R: 'static,
    B: 'static,
    E: 'static,
{
    let release = state.borrow().release.clone();
    let _ = release(Exit::Killed, resource).run(move |released| {
        if released.is_err() {
            tracing::warn!("bracket release failed while its run was being cancelled");
        }
        let (_, killed) = finish(&state);
        if let Some(done) = killed {
            done();
        }
    });
}

fn finish<R, B, E>(state: &RefCell<Bracket<R, B, E>>) -> (Option<Callback<B, E>>, Option<Done>) {
    let mut bracket = state.borrow_mut();
    bracket.phase = Phase::Finished;
    (bracket.callback.take(), bracket.killed.take())
}

struct Shield<A, E> {
    callback: Option<Callback<A, E>>,
    killed: Option<Done>,
    finished: bool,
}

impl<A: 'static, E: 'static> Task<A, E> {
    /// Shields this task from cancellation.
    ///
    /// Cancelling a run of the returned task lets the inner run finish; the
    /// cancellation completes when it does and its result is discarded.
    pub fn uninterruptible(&self) -> Task<A, E> {
        let this = self.clone();

        Task::from_raw(move |callback| {
            let state = Rc::new(RefCell::new(Shield {
                callback: Some(callback),
                killed: None,
                finished: false,
            }));

            let st = state.clone();
            let _ = this.run(move |result| {
                let (callback, killed) = {
                    let mut shield = st.borrow_mut();
                    shield.finished = true;
                    (shield.callback.take(), shield.killed.take())
                };
                match (killed, callback) {
                    (Some(done), _) => done(),
                    (None, Some(callback)) => callback(result),
                    (None, None) => {}
                }
            });

            Canceler::new(move |done| {
                let mut shield = state.borrow_mut();
                if shield.finished {
                    drop(shield);
                    done();
                } else {
                    shield.callback = None;
                    shield.killed = Some(done);
                }
            })
        })
    }
}
