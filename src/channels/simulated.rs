//! Scripted in-memory stand-in for the real application.
//!
//! Interprets the same [`ChannelSelectors`] the WebDriver channel uses, so the
//! resolver and dispatcher run their real code paths against it. Used for
//! rehearsal runs (`--simulate`) and in tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::channels::{Channel, Selector};
use crate::config::ChannelSelectors;
use crate::error::ChannelError;

/// How a scripted contact shows up in search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactScript {
    /// An entry titled exactly like the identifier.
    Exact,
    /// Only a first search result; clicking it may or may not open a chat.
    BestEffort { opens_conversation: bool },
}

/// Fault injected while sending to a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedFault {
    /// The compose box never appears.
    ComposeTimeout,
    /// Clicking the compose box hits an overlay.
    Intercepted,
    /// Commit fails with a generic error.
    Broken,
}

/// Element handle of the simulated UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimElement {
    SearchBox,
    ContactTitle(String),
    FirstResult(String),
    ComposeBox,
}

impl SimElement {
    fn label(&self) -> String {
        match self {
            Self::SearchBox => "search_box".to_string(),
            Self::ContactTitle(name) => format!("contact_title({name})"),
            Self::FirstResult(query) => format!("first_result({query})"),
            Self::ComposeBox => "compose_box".to_string(),
        }
    }
}

/// One recorded capability call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCall {
    Locate(Selector),
    WaitFor(Selector),
    Click(String),
    Clear(String),
    Type { target: String, text: String },
    Commit(String),
}

/// A message the simulated application accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub recipient: String,
    pub body: String,
}

#[derive(Debug, Default)]
struct SimState {
    query: String,
    open_chat: Option<String>,
    draft: String,
    calls: Vec<ChannelCall>,
    sent: Vec<SentMessage>,
}

/// Scripted channel.
pub struct SimulatedChannel {
    selectors: ChannelSelectors,
    contacts: HashMap<String, ContactScript>,
    faults: HashMap<String, SimulatedFault>,
    accept_all: bool,
    state: Mutex<SimState>,
}

impl SimulatedChannel {
    /// A channel where nobody can be found until contacts are scripted.
    pub fn new(selectors: ChannelSelectors) -> Self {
        Self {
            selectors,
            contacts: HashMap::new(),
            faults: HashMap::new(),
            accept_all: false,
            state: Mutex::new(SimState::default()),
        }
    }

    /// A channel where every non-empty query is an exact match.
    pub fn accepting_all(selectors: ChannelSelectors) -> Self {
        Self {
            accept_all: true,
            ..Self::new(selectors)
        }
    }

    pub fn with_contact(mut self, name: impl Into<String>) -> Self {
        self.contacts.insert(name.into(), ContactScript::Exact);
        self
    }

    pub fn with_partial_match(mut self, name: impl Into<String>, opens_conversation: bool) -> Self {
        self.contacts
            .insert(name.into(), ContactScript::BestEffort { opens_conversation });
        self
    }

    pub fn with_fault(mut self, name: impl Into<String>, fault: SimulatedFault) -> Self {
        self.faults.insert(name.into(), fault);
        self
    }

    /// Messages committed so far, in order.
    pub async fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().await.sent.clone()
    }

    /// Every capability call so far, in order.
    pub async fn calls(&self) -> Vec<ChannelCall> {
        self.state.lock().await.calls.clone()
    }

    /// Number of commit actions issued.
    pub async fn commit_count(&self) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| matches!(c, ChannelCall::Commit(_)))
            .count()
    }

    fn script_for(&self, query: &str) -> Option<ContactScript> {
        if let Some(script) = self.contacts.get(query) {
            return Some(*script);
        }
        if self.accept_all && !query.is_empty() {
            return Some(ContactScript::Exact);
        }
        None
    }

    fn lookup(&self, state: &SimState, selector: &Selector) -> Result<SimElement, ChannelError> {
        let missing = || ChannelError::NotPresent {
            selector: selector.to_string(),
        };

        if *selector == self.selectors.search_box {
            return Ok(SimElement::SearchBox);
        }
        if *selector == self.selectors.compose_box {
            let chat = state.open_chat.as_ref().ok_or_else(missing)?;
            if self.faults.get(chat) == Some(&SimulatedFault::ComposeTimeout) {
                return Err(missing());
            }
            return Ok(SimElement::ComposeBox);
        }
        if *selector == self.selectors.first_result {
            return match self.script_for(&state.query) {
                Some(_) => Ok(SimElement::FirstResult(state.query.clone())),
                None => Err(missing()),
            };
        }
        if *selector == self.selectors.contact_title(&state.query) {
            return match self.script_for(&state.query) {
                Some(ContactScript::Exact) => Ok(SimElement::ContactTitle(state.query.clone())),
                _ => Err(missing()),
            };
        }
        Err(missing())
    }
}

#[async_trait]
impl Channel for SimulatedChannel {
    type Handle = SimElement;

    fn name(&self) -> &str {
        "simulated"
    }

    async fn locate(&self, selector: &Selector) -> Result<SimElement, ChannelError> {
        let mut state = self.state.lock().await;
        state.calls.push(ChannelCall::Locate(selector.clone()));
        self.lookup(&state, selector)
    }

    async fn wait_for(
        &self,
        selector: &Selector,
        timeout: Duration,
    ) -> Result<SimElement, ChannelError> {
        let found = {
            let mut state = self.state.lock().await;
            state.calls.push(ChannelCall::WaitFor(selector.clone()));
            self.lookup(&state, selector)
        };
        match found {
            Ok(element) => Ok(element),
            Err(_) => {
                // Nothing will ever appear; burn the full wait like a real driver.
                tokio::time::sleep(timeout).await;
                Err(ChannelError::ElementTimeout {
                    selector: selector.to_string(),
                    timeout,
                })
            }
        }
    }

    async fn click(&self, handle: &SimElement) -> Result<(), ChannelError> {
        let mut state = self.state.lock().await;
        state.calls.push(ChannelCall::Click(handle.label()));
        match handle {
            SimElement::SearchBox => {}
            SimElement::ContactTitle(name) => state.open_chat = Some(name.clone()),
            SimElement::FirstResult(query) => {
                state.open_chat = match self.script_for(query) {
                    Some(ContactScript::BestEffort {
                        opens_conversation: false,
                    }) => None,
                    Some(_) => Some(query.clone()),
                    None => None,
                };
            }
            SimElement::ComposeBox => {
                let chat = state.open_chat.clone().unwrap_or_default();
                if self.faults.get(&chat) == Some(&SimulatedFault::Intercepted) {
                    return Err(ChannelError::Intercepted {
                        selector: self.selectors.compose_box.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    async fn clear(&self, handle: &SimElement) -> Result<(), ChannelError> {
        let mut state = self.state.lock().await;
        state.calls.push(ChannelCall::Clear(handle.label()));
        match handle {
            SimElement::SearchBox => state.query.clear(),
            SimElement::ComposeBox => state.draft.clear(),
            _ => {}
        }
        Ok(())
    }

    async fn type_text(&self, handle: &SimElement, text: &str) -> Result<(), ChannelError> {
        let mut state = self.state.lock().await;
        state.calls.push(ChannelCall::Type {
            target: handle.label(),
            text: text.to_string(),
        });
        match handle {
            SimElement::SearchBox => state.query.push_str(text),
            SimElement::ComposeBox => state.draft.push_str(text),
            other => {
                return Err(ChannelError::Operation(format!(
                    "{} does not accept text",
                    other.label()
                )));
            }
        }
        Ok(())
    }

    async fn commit(&self, handle: &SimElement) -> Result<(), ChannelError> {
        let mut state = self.state.lock().await;
        state.calls.push(ChannelCall::Commit(handle.label()));
        if *handle != SimElement::ComposeBox {
            return Err(ChannelError::Operation(format!(
                "cannot commit {}",
                handle.label()
            )));
        }
        let recipient = state.open_chat.clone().unwrap_or_default();
        if self.faults.get(&recipient) == Some(&SimulatedFault::Broken) {
            return Err(ChannelError::Operation("renderer crashed".to_string()));
        }
        let body = std::mem::take(&mut state.draft);
        state.sent.push(SentMessage { recipient, body });
        Ok(())
    }
}
