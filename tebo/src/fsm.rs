//! Tree-shaped menu state machines addressed by path-like ids.
//!
//! Every state id encodes its path from the root: the root id is a tree symbol followed by
//! `.` (e.g. `0.`), and each child appends one symbol of [`ID_ALPHABET`] chosen by its
//! position among its siblings (`0.0`, `0.1`, `0.1a`, ...). The parent id is therefore the
//! child id minus its last symbol, and any id ending in `.` names the root.
//!
//! Trees are built once through [`FsmBuilder`] before the bot starts and are immutable after.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tebo_core::{
    InlineKeyboard, InlineKeyboardButton, InlineKeyboardMarkup, ReplyMarkup, Result, SendMessage,
    TeboError,
};
use tracing::{debug, error, instrument, warn};

use crate::context::Context;

/// Symbols used for state ids, one per branch.
pub const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Text of the synthesized button leading to the parent state.
pub const BACK_BUTTON_TEXT: &str = "« Back";

const ROOT_SUFFIX: char = '.';
const ROOT_COLUMNS: usize = 1;
const CHILD_COLUMNS: usize = 2;

/// Outcome of a state handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Render {
    /// Show this message; its keyboard is synthesized unless it carries an inline one.
    Message(SendMessage),
    /// Render the parent state instead (e.g. after a failed validation).
    Parent,
    /// Produce no output.
    Nothing,
}

/// Produces the content of a state for a context.
#[async_trait]
pub trait StateHandler: Send + Sync {
    async fn render(&self, ctx: Context) -> Result<Render>;
}

#[async_trait]
impl<F, Fut> StateHandler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Render>> + Send + 'static,
{
    async fn render(&self, ctx: Context) -> Result<Render> {
        (self)(ctx).await
    }
}

/// State handler that always shows `text`.
pub fn text(text: impl Into<String>) -> impl StateHandler {
    let text = text.into();
    move |_ctx: Context| {
        let render: Result<Render> = Ok(Render::Message(SendMessage::new(text.clone())));
        async move { render }
    }
}

/// Computes a transition button per context. `None` hides the transition; a button
/// without payload gets the target state's id.
pub trait ButtonBuilder: Send + Sync {
    fn build(&self, ctx: &Context) -> Option<InlineKeyboardButton>;
}

impl<F> ButtonBuilder for F
where
    F: Fn(&Context) -> Option<InlineKeyboardButton> + Send + Sync,
{
    fn build(&self, ctx: &Context) -> Option<InlineKeyboardButton> {
        (self)(ctx)
    }
}

enum Button {
    Static(String),
    Dynamic(Box<dyn ButtonBuilder>),
}

struct Transition {
    button: Button,
    target: usize,
}

struct Node {
    id: String,
    handler: Arc<dyn StateHandler>,
    transitions: Vec<Transition>,
    columns: usize,
}

/// Handle to a state while the tree is being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateRef(usize);

/// Builds one tree; obtain the immutable [`Fsm`] through `BotBuilder::add_fsm`.
pub struct FsmBuilder {
    nodes: Vec<Node>,
}

impl FsmBuilder {
    /// Tree whose root id is `0.`.
    pub fn new(handler: impl StateHandler + 'static) -> Self {
        Self::with_root(root_id_for(0), handler)
    }

    /// Tree whose root symbol is the `index`-th symbol of [`ID_ALPHABET`].
    pub fn with_index(index: usize, handler: impl StateHandler + 'static) -> Result<Self> {
        let id = ID_ALPHABET
            .get(index)
            .map(|_| root_id_for(index))
            .ok_or_else(|| {
                TeboError::Fsm(format!("at most {} trees per bot", ID_ALPHABET.len()))
            })?;
        Ok(Self::with_root(id, handler))
    }

    fn with_root(id: String, handler: impl StateHandler + 'static) -> Self {
        Self {
            nodes: vec![Node {
                id,
                handler: Arc::new(handler),
                transitions: Vec::new(),
                columns: ROOT_COLUMNS,
            }],
        }
    }

    pub fn root(&self) -> StateRef {
        StateRef(0)
    }

    pub fn id(&self, state: StateRef) -> Option<&str> {
        self.nodes.get(state.0).map(|n| n.id.as_str())
    }

    /// Adds a child of `parent` reached by a button labelled `text`.
    pub fn add(
        &mut self,
        parent: StateRef,
        text: impl Into<String>,
        handler: impl StateHandler + 'static,
    ) -> Result<StateRef> {
        self.push(parent, Button::Static(text.into()), Arc::new(handler))
    }

    /// Adds a child of `parent` whose button is built per context.
    pub fn add_dynamic(
        &mut self,
        parent: StateRef,
        button: impl ButtonBuilder + 'static,
        handler: impl StateHandler + 'static,
    ) -> Result<StateRef> {
        self.push(parent, Button::Dynamic(Box::new(button)), Arc::new(handler))
    }

    /// Keyboard width of `state`; values below 1 are ignored.
    pub fn set_columns(&mut self, state: StateRef, columns: usize) -> &mut Self {
        if columns >= 1 {
            if let Some(node) = self.nodes.get_mut(state.0) {
                node.columns = columns;
            }
        }
        self
    }

    fn push(
        &mut self,
        parent: StateRef,
        button: Button,
        handler: Arc<dyn StateHandler>,
    ) -> Result<StateRef> {
        let parent_node = self
            .nodes
            .get(parent.0)
            .ok_or_else(|| TeboError::Fsm(format!("unknown parent state {:?}", parent)))?;
        let id = child_id(&parent_node.id, parent_node.transitions.len()).ok_or_else(|| {
            TeboError::Fsm(format!(
                "state {} already has {} children",
                parent_node.id,
                ID_ALPHABET.len()
            ))
        })?;

        let target = self.nodes.len();
        self.nodes.push(Node {
            id,
            handler,
            transitions: Vec::new(),
            columns: CHILD_COLUMNS,
        });
        self.nodes[parent.0]
            .transitions
            .push(Transition { button, target });

        Ok(StateRef(target))
    }

    pub(crate) fn build(self) -> Fsm {
        Fsm { nodes: self.nodes }
    }
}

fn root_id_for(index: usize) -> String {
    format!("{}{}", ID_ALPHABET[index] as char, ROOT_SUFFIX)
}

fn child_id(parent_id: &str, position: usize) -> Option<String> {
    ID_ALPHABET
        .get(position)
        .map(|symbol| format!("{}{}", parent_id, *symbol as char))
}

fn is_root_id(id: &str) -> bool {
    id.ends_with(ROOT_SUFFIX)
}

/// Root id of the tree an id belongs to (`"0.1a"` → `"0."`).
pub(crate) fn tree_prefix(id: &str) -> Option<&str> {
    id.find(ROOT_SUFFIX).map(|end| &id[..=end])
}

/// An immutable menu tree.
pub struct Fsm {
    nodes: Vec<Node>,
}

impl Fsm {
    pub fn root(&self) -> State<'_> {
        State {
            fsm: self,
            index: 0,
        }
    }

    pub fn root_id(&self) -> &str {
        &self.nodes[0].id
    }

    /// True when `id` addresses a state of this tree (by its root prefix).
    pub fn owns(&self, id: &str) -> bool {
        tree_prefix(id) == Some(self.root_id())
    }

    /// Finds the state with exactly `id`; any root sentinel resolves to the root.
    pub fn resolve(&self, id: &str) -> Option<State<'_>> {
        if is_root_id(id) {
            return Some(self.root());
        }
        self.find(0, id).map(|index| State { fsm: self, index })
    }

    fn find(&self, index: usize, id: &str) -> Option<usize> {
        let node = &self.nodes[index];
        if node.id == id {
            return Some(index);
        }
        if !id.starts_with(node.id.as_str()) {
            return None;
        }
        node.transitions
            .iter()
            .find_map(|t| self.find(t.target, id))
    }

    /// State addressed by the pressed button of `ctx`.
    pub fn current(&self, ctx: &Context) -> Option<State<'_>> {
        ctx.callback_data().and_then(|id| self.resolve(id))
    }

    fn parent_index(&self, index: usize) -> usize {
        if index == 0 {
            return 0;
        }
        let id = &self.nodes[index].id;
        let parent_id = &id[..id.len() - 1];
        match self.resolve(parent_id) {
            Some(parent) => parent.index,
            None => {
                error!(critical = true, parent_id = %parent_id, "parent state not found");
                0
            }
        }
    }

    /// Renders state `index`, walking up to parents while handlers answer [`Render::Parent`].
    async fn render(&self, mut index: usize, ctx: &Context) -> Result<Option<SendMessage>> {
        loop {
            let node = &self.nodes[index];
            match node.handler.render(ctx.clone()).await? {
                Render::Message(message) => return Ok(Some(self.decorate(index, message, ctx))),
                Render::Parent if index != 0 => {
                    debug!(state_id = %node.id, "state delegated to parent");
                    index = self.parent_index(index);
                }
                Render::Parent | Render::Nothing => return Ok(None),
            }
        }
    }

    /// Attaches the state's keyboard, or re-targets an explicit inline keyboard at
    /// fresh ids under this state in button order.
    fn decorate(&self, index: usize, mut message: SendMessage, ctx: &Context) -> SendMessage {
        let node = &self.nodes[index];
        match message.reply_markup.as_mut() {
            Some(ReplyMarkup::Inline(markup)) => {
                let buttons = markup
                    .inline_keyboard
                    .iter_mut()
                    .flatten()
                    .filter(|b| b.url.is_none());
                for (position, button) in buttons.enumerate() {
                    match child_id(&node.id, position) {
                        Some(id) => button.callback_data = Some(id),
                        None => {
                            warn!(state_id = %node.id, "too many buttons for generated ids");
                            break;
                        }
                    }
                }
            }
            Some(_) => {}
            None => message.reply_markup = Some(self.keyboard(index, ctx).into()),
        }
        message
    }

    fn keyboard(&self, index: usize, ctx: &Context) -> InlineKeyboardMarkup {
        let node = &self.nodes[index];
        let mut keyboard = InlineKeyboard::new(node.columns);

        for transition in &node.transitions {
            let target_id = &self.nodes[transition.target].id;
            match &transition.button {
                Button::Static(text) => {
                    keyboard.add_button(text.as_str(), target_id.as_str());
                }
                Button::Dynamic(builder) => {
                    let Some(mut button) = builder.build(ctx) else {
                        continue;
                    };
                    if button.callback_data.is_none() && button.url.is_none() {
                        button.callback_data = Some(target_id.clone());
                    }
                    keyboard.add(button);
                }
            }
        }

        if index != 0 {
            keyboard.add_button(BACK_BUTTON_TEXT, &node.id[..node.id.len() - 1]);
        }

        keyboard.into_markup()
    }

    /// Entry point from the dispatcher.
    ///
    /// Activates this tree for the chat. Without a pressed button the root is rendered as a
    /// fresh message; otherwise the addressed state is rendered in place of the chat's last
    /// bot message (or sent anew when the user spoke last).
    #[instrument(skip(self, ctx), fields(chat_id = ctx.chat_id(), fsm = %self.root_id()))]
    pub async fn handle(self: Arc<Self>, ctx: &Context) -> Result<()> {
        ctx.chat().set_active_fsm(&self);

        let Some(id) = ctx.callback_data() else {
            if let Some(message) = self.render(0, ctx).await? {
                ctx.send(&message).await?;
            }
            return Ok(());
        };

        let index = self
            .resolve(id)
            .map(|s| s.index)
            .ok_or_else(|| TeboError::Routing(format!("state by id {} not found", id)))?;
        debug!(state_id = %id, "fsm transition");

        if let Some(message) = self.render(index, ctx).await? {
            ctx.edit_or_send(&message).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Fsm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fsm")
            .field("root_id", &self.root_id())
            .field("states", &self.nodes.len())
            .finish()
    }
}

/// A state of a built tree.
#[derive(Clone, Copy)]
pub struct State<'a> {
    fsm: &'a Fsm,
    index: usize,
}

impl<'a> State<'a> {
    pub fn id(&self) -> &'a str {
        &self.fsm.nodes[self.index].id
    }

    pub fn is_root(&self) -> bool {
        self.index == 0
    }

    /// Parent state; the root is its own parent.
    pub fn parent(&self) -> State<'a> {
        State {
            fsm: self.fsm,
            index: self.fsm.parent_index(self.index),
        }
    }

    pub fn children(&self) -> impl Iterator<Item = State<'a>> + 'a {
        let fsm = self.fsm;
        fsm.nodes[self.index]
            .transitions
            .iter()
            .map(move |t| State {
                fsm,
                index: t.target,
            })
    }

    /// Looks `id` up from the root of this state's tree.
    pub fn resolve(&self, id: &str) -> Option<State<'a>> {
        self.fsm.resolve(id)
    }

    /// Button that navigates to this state.
    pub fn button(&self, text: impl Into<String>) -> InlineKeyboardButton {
        InlineKeyboardButton::callback(text, self.id())
    }

    /// Keyboard of this state's transitions plus the back button.
    pub fn keyboard(&self, ctx: &Context) -> InlineKeyboardMarkup {
        self.fsm.keyboard(self.index, ctx)
    }

    /// Renders the message of this state, delegating to parents as handlers request.
    pub async fn message(&self, ctx: &Context) -> Result<Option<SendMessage>> {
        self.fsm.render(self.index, ctx).await
    }
}

impl PartialEq for State<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.fsm, other.fsm) && self.index == other.index
    }
}

impl Eq for State<'_> {}

impl std::fmt::Debug for State<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("State").field(&self.id()).finish()
    }
}
