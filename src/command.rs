//! The fluent command chain.
//!
//! A [`Command`] is a lazy node in a rooted tree: it owns the session, a
//! filtered element [`Context`], and a shared future producing this node's
//! value. Each chained call appends a child node whose work starts only once
//! the parent has settled. Because the future is shared, two children of one
//! node become parallel pipelines that do not wait for each other, while the
//! session's dispatcher still serializes everything on the wire.
//!
//! Element-style steps act on the node's context: a context holding one
//! element dispatches to that element, a multi-element context fans out in
//! parallel (preserving order), and an empty context falls back to the
//! session where the operation exists there.

use futures_util::future::{try_join_all, BoxFuture, FutureExt, Shared};
use serde_json::{json, Value as Json};
use std::future::{Future, IntoFuture};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::element::Element;
use crate::error::CmdError;
use crate::keys::Keys;
use crate::locator::Strategy;
use crate::session::{
    find_all_with_root, find_with_root, FrameTarget, Geolocation, LogEntry, Session, Timeout,
};
use crate::cookies::Cookie;
use crate::poll::{find_displayed_with_root, wait_for_deleted_with_root};

/// The element context carried by a command node.
///
/// `is_single` records whether element-style steps should produce a scalar
/// or a sequence; `depth` is the chain level consumed by [`Command::end`].
#[derive(Debug, Clone)]
pub struct Context {
    elements: Vec<Element>,
    is_single: bool,
    depth: usize,
}

impl Context {
    fn root() -> Context {
        Context {
            elements: Vec::new(),
            is_single: true,
            depth: 0,
        }
    }

    /// The elements element-style steps will act on.
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Whether this context holds a single-element result.
    pub fn is_single(&self) -> bool {
        self.is_single
    }

    /// The chain depth of this context.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

#[derive(Clone)]
struct Step {
    value: Json,
    context: Context,
}

type StepResult = Result<Step, Arc<CmdError>>;
type StepFuture = Shared<BoxFuture<'static, StepResult>>;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

struct Node {
    id: u64,
    parent: Option<Arc<Node>>,
    // Shared with the node's future, which consults it before running.
    cancelled: Arc<AtomicBool>,
    fut: StepFuture,
}

impl Node {
    fn is_cancelled_chain(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        match &self.parent {
            Some(parent) => parent.is_cancelled_chain(),
            None => false,
        }
    }

    fn ancestor_ids(self: &Arc<Node>) -> Vec<u64> {
        let mut ids = Vec::new();
        let mut current = Some(self.clone());
        while let Some(node) = current {
            ids.push(node.id);
            current = node.parent.clone();
        }
        ids
    }
}

/// What a [`Command::then`] callback may resolve to: a plain value, or
/// another command whose settled value is used.
#[derive(Debug)]
pub enum ThenValue {
    /// A plain JSON value.
    Value(Json),
    /// Another command; the chain waits for it and adopts its value.
    Command(Command),
}

impl From<Json> for ThenValue {
    fn from(value: Json) -> ThenValue {
        ThenValue::Value(value)
    }
}

impl From<Command> for ThenValue {
    fn from(command: Command) -> ThenValue {
        ThenValue::Command(command)
    }
}

impl From<()> for ThenValue {
    fn from(_: ()) -> ThenValue {
        ThenValue::Value(Json::Null)
    }
}

/// Handed to [`Command::then`] callbacks so they can replace the node's
/// element context, the way `setContext` does in script-side chains.
#[derive(Debug, Default)]
pub struct ContextSetter {
    replacement: Option<(Vec<Element>, bool)>,
}

impl ContextSetter {
    /// Replace the context with a sequence of elements.
    pub fn set(&mut self, elements: Vec<Element>) {
        self.replacement = Some((elements, false));
    }

    /// Replace the context with a single element.
    pub fn set_single(&mut self, element: Element) {
        self.replacement = Some((vec![element], true));
    }
}

/// A node in a fluent command chain.
///
/// Build a root with [`Command::new`], then chain session and element
/// operations; `.await` the command (or call [`Command::value`]) to settle
/// the whole pipeline and read the final value.
#[derive(Clone)]
pub struct Command {
    session: Session,
    node: Arc<Node>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command").field("node", &self.node.id).finish()
    }
}

impl Command {
    /// Create a chain root bound to a session. The root has an empty,
    /// single-element context at depth 0 and settles immediately.
    pub fn new(session: &Session) -> Command {
        let step = Step {
            value: Json::Null,
            context: Context::root(),
        };
        let fut = async move { Ok(step) }.boxed().shared();
        Command {
            session: session.clone(),
            node: Arc::new(Node {
                id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
                parent: None,
                cancelled: Arc::new(AtomicBool::new(false)),
                fut,
            }),
        }
    }

    /// The session this chain drives.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Cancel this node. The node and every descendant reject with a
    /// `CancelError`; requests that have not yet reached the head of the
    /// session queue never run.
    pub fn cancel(&self) {
        self.node.cancelled.store(true, Ordering::SeqCst);
    }

    fn derive<F, Fut>(&self, f: F) -> Command
    where
        F: FnOnce(Session, Step) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Step, CmdError>> + Send + 'static,
    {
        let session = self.session.clone();
        let parent = self.node.clone();
        let parent_for_node = parent.clone();
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancelled_flag = cancelled.clone();

        let fut = async move {
            if cancelled_flag.load(Ordering::SeqCst) || parent.is_cancelled_chain() {
                return Err(Arc::new(CmdError::Cancelled));
            }
            let step = parent.fut.clone().await?;
            if cancelled_flag.load(Ordering::SeqCst) || parent.is_cancelled_chain() {
                return Err(Arc::new(CmdError::Cancelled));
            }
            f(session, step).await.map_err(Arc::new)
        }
        .boxed()
        .shared();

        Command {
            session: self.session.clone(),
            node: Arc::new(Node {
                id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
                parent: Some(parent_for_node),
                cancelled,
                fut,
            }),
        }
    }

    /// Settle the chain up to this node and return the node's value.
    pub async fn value<T: serde::de::DeserializeOwned>(self) -> Result<T, CmdError> {
        let value = self.into_raw_value().await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn into_raw_value(self) -> Result<Json, CmdError> {
        self.node
            .fut
            .clone()
            .await
            .map(|step| step.value)
            .map_err(CmdError::from_shared)
    }

    /// Settle the chain up to this node, discarding the value.
    pub async fn wait(&self) -> Result<(), CmdError> {
        self.node
            .fut
            .clone()
            .await
            .map(drop)
            .map_err(CmdError::from_shared)
    }

    /// Settle this node and return its element context.
    pub async fn context(&self) -> Result<Context, CmdError> {
        self.node
            .fut
            .clone()
            .await
            .map(|step| step.context)
            .map_err(CmdError::from_shared)
    }
}

impl IntoFuture for Command {
    type Output = Result<Json, CmdError>;
    type IntoFuture = BoxFuture<'static, Result<Json, CmdError>>;

    fn into_future(self) -> Self::IntoFuture {
        self.into_raw_value().boxed()
    }
}

/// Chain primitives.
impl Command {
    /// Append a callback that runs once this node settles successfully.
    ///
    /// The callback receives the settled value and a [`ContextSetter`]; it
    /// may resolve to a plain value or to another [`Command`]. Returning
    /// this command or one of its ancestors can never settle and rejects
    /// with a deadlock error.
    pub fn then<F, R>(&self, f: F) -> Command
    where
        F: FnOnce(Json, &mut ContextSetter) -> Result<R, CmdError> + Send + 'static,
        R: Into<ThenValue>,
    {
        let ancestors = self.node.ancestor_ids();
        self.derive(move |_session, step| async move {
            let mut setter = ContextSetter::default();
            let resolved = f(step.value.clone(), &mut setter)?.into();
            let value = resolve_then_value(resolved, &ancestors).await?;
            Ok(apply_setter(step, setter, value))
        })
    }

    /// Append an error handler; successful values pass through untouched.
    pub fn or_else<F, R>(&self, f: F) -> Command
    where
        F: FnOnce(CmdError, &mut ContextSetter) -> Result<R, CmdError> + Send + 'static,
        R: Into<ThenValue>,
    {
        let ancestors = self.node.ancestor_ids();
        let parent = self.node.clone();
        self.derive_with_error(move |_session, result| async move {
            match result {
                Ok(step) => Ok(step),
                Err(error) => {
                    let context = last_settled_context(&parent).await;
                    let mut setter = ContextSetter::default();
                    let resolved = f(CmdError::from_shared(error), &mut setter)?.into();
                    let value = resolve_then_value(resolved, &ancestors).await?;
                    Ok(apply_setter(
                        Step {
                            value: Json::Null,
                            context,
                        },
                        setter,
                        value,
                    ))
                }
            }
        })
    }

    /// Append a callback that runs whether this node settled or rejected.
    pub fn finally<F, R>(&self, f: F) -> Command
    where
        F: FnOnce(Result<Json, CmdError>, &mut ContextSetter) -> Result<R, CmdError> + Send + 'static,
        R: Into<ThenValue>,
    {
        let ancestors = self.node.ancestor_ids();
        let parent = self.node.clone();
        self.derive_with_error(move |_session, result| async move {
            let (outcome, context) = match result {
                Ok(step) => (Ok(step.value.clone()), step.context),
                Err(error) => (
                    Err(CmdError::from_shared(error)),
                    last_settled_context(&parent).await,
                ),
            };
            let mut setter = ContextSetter::default();
            let resolved = f(outcome, &mut setter)?.into();
            let value = resolve_then_value(resolved, &ancestors).await?;
            Ok(apply_setter(
                Step {
                    value: Json::Null,
                    context,
                },
                setter,
                value,
            ))
        })
    }

    // Like derive, but the closure also observes a parent rejection.
    fn derive_with_error<F, Fut>(&self, f: F) -> Command
    where
        F: FnOnce(Session, Result<Step, Arc<CmdError>>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Step, CmdError>> + Send + 'static,
    {
        let session = self.session.clone();
        let parent = self.node.clone();
        let parent_for_node = parent.clone();
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancelled_flag = cancelled.clone();

        let fut = async move {
            if cancelled_flag.load(Ordering::SeqCst) || parent.is_cancelled_chain() {
                return Err(Arc::new(CmdError::Cancelled));
            }
            let result = parent.fut.clone().await;
            if cancelled_flag.load(Ordering::SeqCst) || parent.is_cancelled_chain() {
                return Err(Arc::new(CmdError::Cancelled));
            }
            f(session, result).await.map_err(Arc::new)
        }
        .boxed()
        .shared();

        Command {
            session: self.session.clone(),
            node: Arc::new(Node {
                id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
                parent: Some(parent_for_node),
                cancelled,
                fut,
            }),
        }
    }

    /// Pause the chain for the given number of milliseconds.
    pub fn sleep(&self, ms: u64) -> Command {
        self.derive(move |_session, step| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(step)
        })
    }

    /// Pop `n` levels of element context, returning to the context of the
    /// ancestor `n` find-steps up. The restored context keeps that
    /// ancestor's depth.
    pub fn end(&self, n: usize) -> Command {
        let parent = self.node.clone();
        self.derive(move |_session, step| async move {
            let mut remaining = n;
            let mut depth = step.context.depth;
            let mut target = step.context.clone();
            let mut current = parent.parent.clone();

            while remaining > 0 {
                let node = match current {
                    Some(node) => node,
                    None => break,
                };
                // Ancestors have settled by the time this node runs, so the
                // await completes immediately.
                if let Ok(ancestor) = node.fut.clone().await {
                    if ancestor.context.depth < depth {
                        remaining -= 1;
                        depth = ancestor.context.depth;
                        target = ancestor.context.clone();
                    }
                }
                current = node.parent.clone();
            }

            Ok(Step {
                value: step.value,
                context: target,
            })
        })
    }
}

async fn resolve_then_value(value: ThenValue, ancestors: &[u64]) -> Result<Json, CmdError> {
    match value {
        ThenValue::Value(value) => Ok(value),
        ThenValue::Command(command) => {
            if ancestors.contains(&command.node.id) {
                return Err(CmdError::Deadlock(
                    "a callback returned its own command chain (or an ancestor of it), \
                     which can never settle"
                        .to_string(),
                ));
            }
            command.into_raw_value().await
        }
    }
}

fn apply_setter(step: Step, setter: ContextSetter, value: Json) -> Step {
    let context = match setter.replacement {
        Some((elements, is_single)) => Context {
            elements,
            is_single,
            depth: step.context.depth + 1,
        },
        None => step.context,
    };
    Step { value, context }
}

// The context a recovery callback starts from: the nearest ancestor that
// settled successfully, or the root context when none did.
async fn last_settled_context(node: &Arc<Node>) -> Context {
    let mut current = node.parent.clone();
    while let Some(ancestor) = current {
        if let Some(Ok(step)) = ancestor.fut.clone().now_or_never() {
            return step.context;
        }
        current = ancestor.parent.clone();
    }
    Context::root()
}

#[derive(Clone, Copy)]
enum FindKind {
    One,
    All,
    Displayed,
}

/// Element location. These steps replace the chain's element context.
impl Command {
    fn find_op(&self, kind: FindKind, strategy: Strategy, value: &str) -> Command {
        let value = value.to_string();
        self.derive(move |session, step| async move {
            let context = step.context;
            let (elements, is_single) = match kind {
                FindKind::One | FindKind::Displayed => {
                    let single = |root: Option<Element>| {
                        let session = session.clone();
                        let value = value.clone();
                        async move {
                            match kind {
                                FindKind::Displayed => {
                                    find_displayed_with_root(
                                        &session,
                                        root.as_ref(),
                                        strategy,
                                        &value,
                                    )
                                    .await
                                }
                                _ => find_with_root(&session, root.as_ref(), strategy, &value).await,
                            }
                        }
                    };
                    if context.elements.is_empty() {
                        (vec![single(None).await?], true)
                    } else if context.is_single {
                        (vec![single(Some(context.elements[0].clone())).await?], true)
                    } else {
                        let found = try_join_all(
                            context.elements.iter().cloned().map(|root| single(Some(root))),
                        )
                        .await?;
                        (found, false)
                    }
                }
                FindKind::All => {
                    let all = |root: Option<Element>| {
                        let session = session.clone();
                        let value = value.clone();
                        async move {
                            find_all_with_root(&session, root.as_ref(), strategy, &value).await
                        }
                    };
                    let found = if context.elements.is_empty() {
                        all(None).await?
                    } else if context.is_single {
                        all(Some(context.elements[0].clone())).await?
                    } else {
                        // One findAll per context element; sub-results keep
                        // their internal order and follow the context order,
                        // flattened one level. No document-order resort.
                        try_join_all(context.elements.iter().cloned().map(|root| all(Some(root))))
                            .await?
                            .into_iter()
                            .flatten()
                            .collect()
                    };
                    (found, false)
                }
            };

            let value = elements_to_json(&elements, is_single)?;
            Ok(Step {
                value,
                context: Context {
                    elements,
                    is_single,
                    depth: context.depth + 1,
                },
            })
        })
    }

    /// Find an element, scoped to the current context.
    pub fn find(&self, strategy: Strategy, value: &str) -> Command {
        self.find_op(FindKind::One, strategy, value)
    }

    /// Find all matching elements, scoped to the current context.
    pub fn find_all(&self, strategy: Strategy, value: &str) -> Command {
        self.find_op(FindKind::All, strategy, value)
    }

    /// Find the first displayed matching element, scoped to the current
    /// context.
    pub fn find_displayed(&self, strategy: Strategy, value: &str) -> Command {
        self.find_op(FindKind::Displayed, strategy, value)
    }

    /// Wait for matching elements to leave the DOM, scoped to the current
    /// context.
    pub fn wait_for_deleted(&self, strategy: Strategy, value: &str) -> Command {
        let value = value.to_string();
        self.derive(move |session, step| async move {
            let context = &step.context;
            if context.elements.is_empty() {
                session.wait_for_deleted(strategy, &value).await?;
            } else if context.is_single {
                wait_for_deleted_with_root(
                    &session,
                    Some(&context.elements[0]),
                    strategy,
                    &value,
                )
                .await?;
            } else {
                try_join_all(context.elements.iter().map(|root| {
                    wait_for_deleted_with_root(&session, Some(root), strategy, &value)
                }))
                .await?;
            }
            Ok(Step {
                value: Json::Null,
                context: step.context,
            })
        })
    }

    /// Make the currently focused element the chain's context.
    pub fn get_active_element(&self) -> Command {
        self.derive(move |session, step| async move {
            let element = session.get_active_element().await?;
            let value = element.to_json()?;
            Ok(Step {
                value,
                context: Context {
                    elements: vec![element],
                    is_single: true,
                    depth: step.context.depth + 1,
                },
            })
        })
    }
}

fn elements_to_json(elements: &[Element], is_single: bool) -> Result<Json, CmdError> {
    if is_single {
        elements
            .first()
            .map(Element::to_json)
            .unwrap_or(Ok(Json::Null))
    } else {
        Ok(Json::Array(
            elements.iter().map(Element::to_json).collect::<Result<_, _>>()?,
        ))
    }
}

/// Element-style steps, applied across the current context.
impl Command {
    fn element_op<F>(&self, name: &'static str, f: F) -> Command
    where
        F: Fn(Element) -> BoxFuture<'static, Result<Json, CmdError>> + Send + Sync + 'static,
    {
        self.derive(move |_session, step| async move {
            let context = step.context;
            if context.elements.is_empty() {
                return Err(CmdError::InvalidArgument(
                    name.to_string(),
                    "command has no element context; find an element first".to_string(),
                ));
            }
            let value = if context.is_single {
                f(context.elements[0].clone()).await?
            } else {
                let results =
                    try_join_all(context.elements.iter().cloned().map(&f)).await?;
                Json::Array(results)
            };
            Ok(Step { value, context })
        })
    }

    /// Click the context element(s).
    pub fn click(&self) -> Command {
        self.element_op("click", |element| {
            async move { element.click().await.map(|_| Json::Null) }.boxed()
        })
    }

    /// Submit the form owning the context element(s).
    pub fn submit(&self) -> Command {
        self.element_op("submit", |element| {
            async move { element.submit().await.map(|_| Json::Null) }.boxed()
        })
    }

    /// Type keys into the context element(s).
    pub fn type_keys(&self, keys: impl Into<Keys>) -> Command {
        let keys = keys.into();
        self.element_op("type_keys", move |element| {
            let keys = keys.clone();
            async move { element.type_keys(keys).await.map(|_| Json::Null) }.boxed()
        })
    }

    /// Clear the value of the context element(s).
    pub fn clear_value(&self) -> Command {
        self.element_op("clear_value", |element| {
            async move { element.clear_value().await.map(|_| Json::Null) }.boxed()
        })
    }

    /// The visible text of the context element(s).
    pub fn get_visible_text(&self) -> Command {
        self.element_op("get_visible_text", |element| {
            async move { element.get_visible_text().await.map(Json::String) }.boxed()
        })
    }

    /// The tag name of the context element(s).
    pub fn get_tag_name(&self) -> Command {
        self.element_op("get_tag_name", |element| {
            async move { element.get_tag_name().await.map(Json::String) }.boxed()
        })
    }

    /// Whether the context element(s) are selected.
    pub fn is_selected(&self) -> Command {
        self.element_op("is_selected", |element| {
            async move { element.is_selected().await.map(Json::Bool) }.boxed()
        })
    }

    /// Whether the context element(s) are enabled.
    pub fn is_enabled(&self) -> Command {
        self.element_op("is_enabled", |element| {
            async move { element.is_enabled().await.map(Json::Bool) }.boxed()
        })
    }

    /// Whether the context element(s) are displayed.
    pub fn is_displayed(&self) -> Command {
        self.element_op("is_displayed", |element| {
            async move { element.is_displayed().await.map(Json::Bool) }.boxed()
        })
    }

    /// An attribute of the context element(s), with DOM semantics.
    pub fn get_attribute(&self, name: &str) -> Command {
        let name = name.to_string();
        self.element_op("get_attribute", move |element| {
            let name = name.clone();
            async move {
                element
                    .get_attribute(&name)
                    .await
                    .map(|v| v.map(Json::String).unwrap_or(Json::Null))
            }
            .boxed()
        })
    }

    /// The raw attribute of the context element(s).
    pub fn get_spec_attribute(&self, name: &str) -> Command {
        let name = name.to_string();
        self.element_op("get_spec_attribute", move |element| {
            let name = name.clone();
            async move {
                element
                    .get_spec_attribute(&name)
                    .await
                    .map(|v| v.map(Json::String).unwrap_or(Json::Null))
            }
            .boxed()
        })
    }

    /// A DOM property of the context element(s).
    pub fn get_property(&self, name: &str) -> Command {
        let name = name.to_string();
        self.element_op("get_property", move |element| {
            let name = name.clone();
            async move { element.get_property(&name).await }.boxed()
        })
    }

    /// A computed CSS style of the context element(s).
    pub fn get_computed_style(&self, property: &str) -> Command {
        let property = property.to_string();
        self.element_op("get_computed_style", move |element| {
            let property = property.clone();
            async move { element.get_computed_style(&property).await.map(Json::String) }.boxed()
        })
    }

    /// The page position of the context element(s).
    pub fn get_position(&self) -> Command {
        self.element_op("get_position", |element| {
            async move {
                let (x, y) = element.get_position().await?;
                Ok(json!({ "x": x, "y": y }))
            }
            .boxed()
        })
    }

    /// The rendered size of the context element(s).
    pub fn get_size(&self) -> Command {
        self.element_op("get_size", |element| {
            async move {
                let (width, height) = element.get_size().await?;
                Ok(json!({ "width": width, "height": height }))
            }
            .boxed()
        })
    }
}

// A session-level step: runs the closure, serializes its result as the
// node's value, and keeps the parent context.
macro_rules! session_step {
    ($self:ident, |$session:ident| $body:expr) => {
        $self.derive(move |$session, step| async move {
            let value = serde_json::to_value($body.await?)?;
            Ok(Step {
                value,
                context: step.context,
            })
        })
    };
}

/// Session-style steps. The element context passes through unchanged.
impl Command {
    /// Navigate to a URL.
    pub fn get(&self, url: &str) -> Command {
        let url = url.to_string();
        session_step!(self, |session| session.get(&url))
    }

    /// Reload the current page.
    pub fn refresh(&self) -> Command {
        session_step!(self, |session| session.refresh())
    }

    /// Navigate backwards in the history.
    pub fn go_back(&self) -> Command {
        session_step!(self, |session| session.go_back())
    }

    /// Navigate forwards in the history.
    pub fn go_forward(&self) -> Command {
        session_step!(self, |session| session.go_forward())
    }

    /// The title of the focused window.
    pub fn get_page_title(&self) -> Command {
        session_step!(self, |session| session.get_page_title())
    }

    /// The URL of the focused window.
    pub fn get_current_url(&self) -> Command {
        session_step!(self, |session| session.get_current_url())
    }

    /// The HTML source of the current page.
    pub fn get_page_source(&self) -> Command {
        session_step!(self, |session| session.get_page_source())
    }

    /// A PNG screenshot of the focused window.
    pub fn take_screenshot(&self) -> Command {
        session_step!(self, |session| session.take_screenshot())
    }

    /// Execute JavaScript in the page.
    pub fn execute(&self, script: &str, args: Vec<Json>) -> Command {
        let script = script.to_string();
        self.derive(move |session, step| async move {
            let value = session.execute(&script, args).await?;
            Ok(Step {
                value,
                context: step.context,
            })
        })
    }

    /// Execute asynchronous JavaScript in the page.
    pub fn execute_async(&self, script: &str, args: Vec<Json>) -> Command {
        let script = script.to_string();
        self.derive(move |session, step| async move {
            let value = session.execute_async(&script, args).await?;
            Ok(Step {
                value,
                context: step.context,
            })
        })
    }

    /// Poll the given in-page function until it produces a value.
    pub fn poll_until(&self, poller: &str, args: Vec<Json>, timeout_ms: Option<u64>) -> Command {
        let poller = poller.to_string();
        self.derive(move |session, step| async move {
            let value = session.poll_until(&poller, args, timeout_ms).await?;
            Ok(Step {
                value,
                context: step.context,
            })
        })
    }

    /// Set one of the driver-managed timeouts.
    pub fn set_timeout(&self, kind: Timeout, ms: u64) -> Command {
        session_step!(self, |session| session.set_timeout(kind, ms))
    }

    /// Set the implicit find timeout.
    pub fn set_find_timeout(&self, ms: u64) -> Command {
        session_step!(self, |session| session.set_find_timeout(ms))
    }

    /// Set the asynchronous-script timeout.
    pub fn set_execute_async_timeout(&self, ms: u64) -> Command {
        session_step!(self, |session| session.set_execute_async_timeout(ms))
    }

    /// Set the page-load timeout.
    pub fn set_page_load_timeout(&self, ms: u64) -> Command {
        session_step!(self, |session| session.set_page_load_timeout(ms))
    }

    /// Send keys to the focused element.
    pub fn press_keys(&self, keys: impl Into<Keys>) -> Command {
        let keys = keys.into();
        session_step!(self, |session| session.press_keys(keys))
    }

    /// Move the mouse. With a non-empty context the move is relative to the
    /// context element; otherwise relative to the last mouse position.
    pub fn move_mouse_to(&self, x_offset: Option<i64>, y_offset: Option<i64>) -> Command {
        self.derive(move |session, step| async move {
            let context = &step.context;
            if context.elements.is_empty() {
                session.move_mouse_to(None, x_offset, y_offset).await?;
            } else if context.is_single {
                session
                    .move_mouse_to(Some(&context.elements[0]), x_offset, y_offset)
                    .await?;
            } else {
                for element in &context.elements {
                    session.move_mouse_to(Some(element), x_offset, y_offset).await?;
                }
            }
            Ok(Step {
                value: Json::Null,
                context: step.context,
            })
        })
    }

    /// Click a mouse button at the current mouse position.
    pub fn click_mouse_button(&self, button: u64) -> Command {
        session_step!(self, |session| session.click_mouse_button(button))
    }

    /// Press a mouse button.
    pub fn press_mouse_button(&self, button: u64) -> Command {
        session_step!(self, |session| session.press_mouse_button(button))
    }

    /// Release a mouse button.
    pub fn release_mouse_button(&self, button: u64) -> Command {
        session_step!(self, |session| session.release_mouse_button(button))
    }

    /// Double-click at the current mouse position.
    pub fn double_click(&self) -> Command {
        session_step!(self, |session| session.double_click())
    }

    /// Tap the context element.
    pub fn tap(&self) -> Command {
        self.element_op("tap", |element| {
            async move {
                let session = element.session().clone();
                session.tap(&element).await.map(|_| Json::Null)
            }
            .boxed()
        })
    }

    /// All cookies visible to the current page.
    pub fn get_cookies(&self) -> Command {
        self.derive(move |session, step| async move {
            let cookies = session.get_cookies().await?;
            let wire: Vec<Json> = cookies
                .iter()
                .map(|c| {
                    json!({
                        "name": c.name(),
                        "value": c.value(),
                        "path": c.path(),
                        "domain": c.domain(),
                    })
                })
                .collect();
            Ok(Step {
                value: Json::Array(wire),
                context: step.context,
            })
        })
    }

    /// Set a cookie.
    pub fn set_cookie(&self, cookie: Cookie<'static>) -> Command {
        session_step!(self, |session| session.set_cookie(&cookie))
    }

    /// Delete all cookies.
    pub fn clear_cookies(&self) -> Command {
        session_step!(self, |session| session.clear_cookies())
    }

    /// Delete one cookie by name.
    pub fn delete_cookie(&self, name: &str) -> Command {
        let name = name.to_string();
        session_step!(self, |session| session.delete_cookie(&name))
    }

    /// The message of the open prompt.
    pub fn get_alert_text(&self) -> Command {
        session_step!(self, |session| session.get_alert_text())
    }

    /// Type into the open prompt.
    pub fn type_in_prompt(&self, keys: impl Into<Keys>) -> Command {
        let keys = keys.into();
        session_step!(self, |session| session.type_in_prompt(keys))
    }

    /// Accept the open prompt.
    pub fn accept_alert(&self) -> Command {
        session_step!(self, |session| session.accept_alert())
    }

    /// Dismiss the open prompt.
    pub fn dismiss_alert(&self) -> Command {
        session_step!(self, |session| session.dismiss_alert())
    }

    /// Switch the focused window.
    pub fn switch_to_window(&self, handle: &str) -> Command {
        let handle = handle.to_string();
        session_step!(self, |session| session.switch_to_window(&handle))
    }

    /// Switch the focused frame.
    pub fn switch_to_frame(&self, frame: impl Into<FrameTarget>) -> Command {
        let frame = frame.into();
        session_step!(self, |session| session.switch_to_frame(frame))
    }

    /// Switch to the parent of the focused frame.
    pub fn switch_to_parent_frame(&self) -> Command {
        session_step!(self, |session| session.switch_to_parent_frame())
    }

    /// Close the focused window.
    pub fn close_current_window(&self) -> Command {
        session_step!(self, |session| session.close_current_window())
    }

    /// The handle of the focused window.
    pub fn get_current_window_handle(&self) -> Command {
        session_step!(self, |session| session.get_current_window_handle())
    }

    /// The handles of every open window.
    pub fn get_all_window_handles(&self) -> Command {
        session_step!(self, |session| session.get_all_window_handles())
    }

    /// Resize the focused window.
    pub fn set_window_size(&self, width: u32, height: u32) -> Command {
        session_step!(self, |session| session.set_window_size(width, height))
    }

    /// The size of the focused window.
    pub fn get_window_size(&self) -> Command {
        session_step!(self, |session| session.get_window_size())
    }

    /// Move the focused window.
    pub fn set_window_position(&self, x: i32, y: i32) -> Command {
        session_step!(self, |session| session.set_window_position(x, y))
    }

    /// The position of the focused window.
    pub fn get_window_position(&self) -> Command {
        session_step!(self, |session| session.get_window_position())
    }

    /// Maximize the focused window.
    pub fn maximize_window(&self) -> Command {
        session_step!(self, |session| session.maximize_window())
    }

    /// The current simulated location.
    pub fn get_geolocation(&self) -> Command {
        session_step!(self, |session| session.get_geolocation())
    }

    /// Set the simulated location.
    pub fn set_geolocation(&self, location: Geolocation) -> Command {
        session_step!(self, |session| async move {
            session.set_geolocation(&location).await
        })
    }

    /// Fetch and clear a remote log.
    pub fn get_logs_for(&self, log_type: &str) -> Command {
        let log_type = log_type.to_string();
        self.derive(move |session, step| async move {
            let entries: Vec<LogEntry> = session.get_logs_for(&log_type).await?;
            Ok(Step {
                value: serde_json::to_value(entries)?,
                context: step.context,
            })
        })
    }

    /// End the session.
    pub fn quit(&self) -> Command {
        session_step!(self, |session| session.quit())
    }
}

// Strategy-suffixed shortcut families for chains.
macro_rules! command_strategy_helpers {
    ($(($method:ident, $strategy:ident)),*$(,)?) => {
        paste::paste! {
            /// Shortcut methods, one family per locator strategy.
            impl Command {
                $(
                    /// Find an element by
                    #[doc = concat!("`", stringify!($method), "`.")]
                    pub fn [<find_by_ $method>](&self, value: &str) -> Command {
                        self.find(Strategy::$strategy, value)
                    }

                    /// Find all elements by
                    #[doc = concat!("`", stringify!($method), "`.")]
                    pub fn [<find_all_by_ $method>](&self, value: &str) -> Command {
                        self.find_all(Strategy::$strategy, value)
                    }

                    /// Find the first displayed element by
                    #[doc = concat!("`", stringify!($method), "`.")]
                    pub fn [<find_displayed_by_ $method>](&self, value: &str) -> Command {
                        self.find_displayed(Strategy::$strategy, value)
                    }

                    /// Wait for elements matching the given
                    #[doc = concat!("`", stringify!($method), "` value to leave the DOM.")]
                    pub fn [<wait_for_deleted_by_ $method>](&self, value: &str) -> Command {
                        self.wait_for_deleted(Strategy::$strategy, value)
                    }
                )*
            }
        }
    }
}

command_strategy_helpers![
    (class_name, ClassName),
    (css_selector, CssSelector),
    (id, Id),
    (name, Name),
    (link_text, LinkText),
    (partial_link_text, PartialLinkText),
    (tag_name, TagName),
    (xpath, XPath),
];
