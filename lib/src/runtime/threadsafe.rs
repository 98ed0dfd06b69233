use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;

use crate::automaton::Automaton;
use crate::errors::Error;
use crate::runtime::limits::LimitRegistry;
use crate::runtime::{ExecMode, Executable, MatcherContext};

/// Runs an executable from several threads at once.
///
/// The executable and the input are shared by all the threads. Each call
/// to [`ThreadSafeContext::execute`] gets a [`MatcherContext`] of its own,
/// taken from a pool or created on the fly, so threads never share mutable
/// matching state. Contexts are returned to the pool when the call ends,
/// and kept for later calls as long as the pool has fewer than
/// `max_contexts` of them. A returned context gets back the registry and
/// the settings it was created with, whatever the call changed.
///
/// ```
/// # use std::sync::Arc;
/// # use rift::{Flags, Pattern, ThreadSafeContext};
/// let pattern = Arc::new(Pattern::new(r"\w+", Flags::empty()).unwrap());
/// let mut tsc = ThreadSafeContext::new(pattern, 4, 1000);
/// tsc.set_input("one two three four");
///
/// let words: Vec<usize> = std::thread::scope(|s| {
///     let handles: Vec<_> = [(0, 7), (8, 18)]
///         .into_iter()
///         .map(|(start, end)| {
///             let tsc = &tsc;
///             s.spawn(move || {
///                 tsc.execute(|ctx, pattern| {
///                     ctx.set_region(start, end)?;
///                     Ok(ctx.find_all(pattern, 0)?.len())
///                 })
///             })
///         })
///         .collect();
///     handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect()
/// });
///
/// assert_eq!(words, vec![2, 2]);
/// ```
#[derive(Debug)]
pub struct ThreadSafeContext<E: Executable + Send + Sync = Automaton> {
    target: Arc<E>,
    input: Arc<str>,
    pool: Mutex<Vec<MatcherContext>>,
    max_contexts: usize,
    max_backtrack_depth: usize,
    registry: Arc<LimitRegistry>,
}

impl<E: Executable + Send + Sync> ThreadSafeContext<E> {
    /// Creates a context for `target`.
    ///
    /// `max_contexts` is the number of idle contexts kept in the pool, and
    /// `max_backtrack_depth` the depth limit applied to every context.
    pub fn new(target: Arc<E>, max_contexts: usize, max_backtrack_depth: usize) -> Self {
        Self {
            target,
            input: Arc::from(""),
            pool: Mutex::new(Vec::with_capacity(max_contexts)),
            max_contexts,
            max_backtrack_depth,
            registry: Arc::new(LimitRegistry::new()),
        }
    }

    /// Replaces the input shared by all the threads.
    pub fn set_input(&mut self, input: &str) {
        self.input = Arc::from(input);
    }

    /// The shared input.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// The executable.
    pub fn target(&self) -> &Arc<E> {
        &self.target
    }

    /// Registry used by the contexts created from now on.
    pub fn registry(&self) -> &Arc<LimitRegistry> {
        &self.registry
    }

    /// Replaces the registry and discards the pooled contexts, which were
    /// created with the previous one.
    pub fn set_registry(&mut self, registry: Arc<LimitRegistry>) -> Result<(), Error> {
        self.registry = registry;
        self.reset_all()
    }

    /// Discards the pooled contexts.
    pub fn reset_all(&self) -> Result<(), Error> {
        self.lock()?.clear();
        Ok(())
    }

    /// Number of idle contexts in the pool.
    pub fn pooled(&self) -> Result<usize, Error> {
        Ok(self.lock()?.len())
    }

    /// Runs `f` with a context set up for the shared input and the
    /// executable.
    ///
    /// The context starts at position zero without a region. Errors
    /// returned by `f` are returned as is.
    pub fn execute<R, F>(&self, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut MatcherContext, &E) -> Result<R, Error>,
    {
        let mut ctx = match self.lock()?.pop() {
            Some(ctx) => ctx,
            None => self.new_context()?,
        };

        ctx.set_shared_input(Arc::clone(&self.input));

        let match_id = ctx.match_id();
        let result = f(&mut ctx, &self.target);

        // Settings changed by `f` must not reach the next borrower.
        ctx.set_match_id(match_id);
        let reset = self.configure(&mut ctx);

        let mut pool = self.lock()?;
        if reset.is_ok() && pool.len() < self.max_contexts {
            pool.push(ctx);
        }

        result
    }

    fn new_context(&self) -> Result<MatcherContext, Error> {
        debug!("creating matcher context");
        let mut ctx = MatcherContext::new();
        self.configure(&mut ctx)?;
        Ok(ctx)
    }

    /// Gives the context the registry, depth limit, execution mode and
    /// bailout manager every context of the pool starts with.
    fn configure(&self, ctx: &mut MatcherContext) -> Result<(), Error> {
        ctx.set_registry(Arc::clone(&self.registry));
        ctx.set_exec_mode(ExecMode::default());
        ctx.set_bailout_manager(None);
        ctx.set_max_depth(self.max_backtrack_depth)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<MatcherContext>>, Error> {
        self.pool
            .lock()
            .map_err(|_| Error::internal("matcher context pool is poisoned"))
    }
}
