/// Background router: content scripts on one side, devtools panels on the other
///
/// Content scripts reach the background with one-shot runtime messages
/// tagged with their tab; panels hold a long-lived port and say which tab
/// they inspect in their first message.

use crate::bridge::chrome::{self, Port};
use crate::config::DevtoolsConfig;
use crate::relay::{CommitBuffer, Context, Direction, Envelope};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Port name panels connect with
pub const PANEL_PORT: &str = "fiber-lens-panel";

pub type TabId = i32;

/// What a panel sends over its port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PanelMessage {
    Relay(Envelope),
    #[serde(rename_all = "camelCase")]
    Init { tab_id: TabId },
}

#[derive(Debug, Default)]
struct TabRoute {
    panel_connected: bool,
    buffer: CommitBuffer,
}

/// Per-tab routing state
#[derive(Debug)]
pub struct Router {
    capacity: usize,
    tabs: HashMap<TabId, TabRoute>,
}

impl Router {
    pub fn new(capacity: usize) -> Self {
        Router {
            capacity,
            tabs: HashMap::new(),
        }
    }

    fn route(&mut self, tab: TabId) -> &mut TabRoute {
        let capacity = self.capacity;
        self.tabs.entry(tab).or_insert_with(|| TabRoute {
            panel_connected: false,
            buffer: CommitBuffer::new(capacity),
        })
    }

    /// An envelope from the content script of `tab`. Returns it when a
    /// panel is there to take it; it is buffered either way.
    pub fn from_content(&mut self, tab: TabId, envelope: Envelope) -> Option<Envelope> {
        let from_page_side = envelope.is_from(Context::Page) || envelope.is_from(Context::ContentScript);
        if !from_page_side || envelope.payload.direction() != Direction::Upstream {
            log::trace!("Dropping {} from {} in tab {}", envelope.payload.kind(), envelope.source, tab);
            return None;
        }

        let route = self.route(tab);
        route.buffer.record(&envelope);
        if route.panel_connected {
            Some(envelope)
        } else {
            log::debug!("No panel for tab {}, buffered {}", tab, envelope.payload.kind());
            None
        }
    }

    /// A panel attached to `tab`; returns what it missed, oldest first.
    pub fn connect_panel(&mut self, tab: TabId) -> Vec<Envelope> {
        let route = self.route(tab);
        route.panel_connected = true;
        let replay = route.buffer.replay();
        log::debug!("Panel connected to tab {}, replaying {} messages", tab, replay.len());
        replay
    }

    pub fn disconnect_panel(&mut self, tab: TabId) {
        if let Some(route) = self.tabs.get_mut(&tab) {
            route.panel_connected = false;
        }
    }

    pub fn has_panel(&self, tab: TabId) -> bool {
        self.tabs.get(&tab).is_some_and(|route| route.panel_connected)
    }

    /// A command from the panel of `tab`, to be handed to its content script
    pub fn from_panel(&self, tab: TabId, envelope: Envelope) -> Option<Envelope> {
        if !envelope.is_from(Context::Panel) || envelope.payload.direction() != Direction::Downstream {
            log::trace!("Dropping {} from panel of tab {}", envelope.payload.kind(), tab);
            return None;
        }
        Some(envelope)
    }

    pub fn tab_closed(&mut self, tab: TabId) {
        self.tabs.remove(&tab);
    }

    pub fn buffered_commits(&self, tab: TabId) -> usize {
        self.tabs.get(&tab).map_or(0, |route| route.buffer.commit_count())
    }
}

/// Start routing in the extension's background context
pub fn run(config: DevtoolsConfig) {
    let router = Rc::new(RefCell::new(Router::new(config.relay.buffer_capacity)));
    let panels: Rc<RefCell<HashMap<TabId, Port>>> = Rc::default();

    {
        let (router, panels) = (Rc::clone(&router), Rc::clone(&panels));
        chrome::on_runtime_message(move |message, tab| {
            let Some(tab) = tab else {
                return;
            };
            let Some(envelope) = crate::bridge::envelope(message) else {
                return;
            };
            let delivery = router.borrow_mut().from_content(tab, envelope);
            if let Some(envelope) = delivery {
                let port = panels.borrow().get(&tab).cloned();
                if let Some(port) = port {
                    port.send(&envelope);
                }
            }
        });
    }

    {
        let (router, panels) = (Rc::clone(&router), Rc::clone(&panels));
        chrome::on_connect(move |port: Port| {
            if port.name() != PANEL_PORT {
                return;
            }
            let tab: Rc<Cell<Option<TabId>>> = Rc::default();

            {
                let (router, panels, tab, port) =
                    (Rc::clone(&router), Rc::clone(&panels), Rc::clone(&tab), port.clone());
                port.clone().on_message(move |message| {
                    match crate::bridge::from_js::<PanelMessage>(message) {
                        Ok(PanelMessage::Init { tab_id }) => {
                            tab.set(Some(tab_id));
                            panels.borrow_mut().insert(tab_id, port.clone());
                            let replay = router.borrow_mut().connect_panel(tab_id);
                            for envelope in &replay {
                                port.send(envelope);
                            }
                        }
                        Ok(PanelMessage::Relay(envelope)) => {
                            let Some(tab_id) = tab.get() else {
                                log::warn!("Panel sent {} before naming its tab", envelope.payload.kind());
                                return;
                            };
                            if let Some(envelope) = router.borrow().from_panel(tab_id, envelope) {
                                chrome::send_to_tab(tab_id, &envelope);
                            }
                        }
                        Err(e) => log::debug!("Ignoring panel message: {}", e),
                    }
                });
            }

            let (router, panels) = (Rc::clone(&router), Rc::clone(&panels));
            port.on_disconnect(move || {
                if let Some(tab_id) = tab.take() {
                    log::debug!("Panel for tab {} disconnected", tab_id);
                    panels.borrow_mut().remove(&tab_id);
                    router.borrow_mut().disconnect_panel(tab_id);
                }
            });
        });
    }

    chrome::on_tab_removed(move |tab_id| {
        panels.borrow_mut().remove(&tab_id);
        router.borrow_mut().tab_closed(tab_id);
    });

    log::debug!("Background router running");
}
