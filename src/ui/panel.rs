/// The devtools panel: component tree, details and inspect controls
use crate::background::{PANEL_PORT, PanelMessage};
use crate::bridge::{self, chrome::{self, Port}};
use crate::relay::{Context, Envelope, NodeRef, Payload};
use crate::serialized::{SerializedNode, SerializedValue, tag_label};
use crate::ui::state::{LoadState, PanelAction, PanelState};
use patternfly_yew::prelude::*;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use web_sys::HtmlInputElement;
use yew::prelude::*;

type PortSlot = Rc<RefCell<Option<Port>>>;

/// Send a command towards the page through the background
fn command(port: &PortSlot, payload: Payload) {
    match port.borrow().as_ref() {
        Some(port) => port.send(&PanelMessage::Relay(Envelope::new(Context::Panel, payload))),
        None => log::debug!("Panel not connected, dropping {}", payload.kind()),
    }
}

#[function_component(Panel)]
pub fn panel() -> Html {
    let state = use_reducer(PanelState::default);
    let port: PortSlot = use_mut_ref(|| None);

    {
        let dispatcher = state.dispatcher();
        let port = port.clone();
        use_effect_with((), move |_| {
            let connection = chrome::connect(PANEL_PORT);
            match chrome::inspected_tab_id() {
                Some(tab_id) => connection.send(&PanelMessage::Init { tab_id }),
                None => log::warn!("Panel opened without an inspected tab"),
            }
            connection.on_message(move |message| {
                if let Some(envelope) = bridge::envelope(message) {
                    dispatcher.dispatch(PanelAction::Received(envelope));
                }
            });
            connection.on_disconnect(|| log::info!("Panel lost its connection to the background"));
            *port.borrow_mut() = Some(connection);
            command(&port, Payload::GetFiberRoots);
        });
    }

    let on_inspect = {
        let (state, port) = (state.clone(), port.clone());
        Callback::from(move |_| {
            let start = !state.inspecting;
            state.dispatch(PanelAction::SetInspecting(start));
            command(
                &port,
                if start { Payload::StartInspecting } else { Payload::StopInspecting },
            );
        })
    };

    let on_refresh = {
        let port = port.clone();
        Callback::from(move |_| command(&port, Payload::GetFiberRoots))
    };

    let on_clear_highlight = {
        let port = port.clone();
        Callback::from(move |_| command(&port, Payload::ClearHighlight))
    };

    let on_search_input = {
        let state = state.clone();
        Callback::from(move |e: InputEvent| {
            if let Some(input) = e.target_dyn_into::<HtmlInputElement>() {
                state.dispatch(PanelAction::Search(input.value()));
            }
        })
    };

    let on_select = {
        let (state, port) = (state.clone(), port.clone());
        Callback::from(move |node: NodeRef| {
            state.dispatch(PanelAction::Select(node.clone()));
            command(&port, Payload::HighlightNode(node));
        })
    };

    let on_toggle = {
        let state = state.clone();
        Callback::from(move |node: NodeRef| state.dispatch(PanelAction::ToggleCollapsed(node)))
    };

    let tree = TreeView {
        state: &*state,
        matches: state.matches(),
        on_select,
        on_toggle,
    };

    html! {
        <div class="container">
            <div class="header">
                <h1 class="main-title">{"Fiber Lens"}</h1>
                if let Some(version) = state.version.clone() {
                    <span class="version">{format!("React {}", version)}</span>
                }
                <Button onclick={on_inspect} variant={if state.inspecting { ButtonVariant::Primary } else { ButtonVariant::Secondary }}>
                    {if state.inspecting { "Stop inspecting" } else { "Inspect" }}
                </Button>
                <Button onclick={on_refresh} variant={ButtonVariant::Secondary}>
                    {"Refresh"}
                </Button>
                <Button onclick={on_clear_highlight} variant={ButtonVariant::Secondary}>
                    {"Clear highlight"}
                </Button>
            </div>

            // Status display
            {match state.load {
                LoadState::Detecting | LoadState::ReactDetected => html! {
                    <div class="loading-text-center">
                        <Spinner />
                        <p class="loading-text">{state.load.message()}</p>
                    </div>
                },
                LoadState::NotDetected => html! {
                    <Alert r#type={AlertType::Info} title={state.load.message()} inline={true}>
                        {"The panel keeps listening in case React loads later."}
                    </Alert>
                },
                LoadState::ComponentsLoaded => html! {}
            }}

            <div class="search-container">
                <input
                    type="text"
                    placeholder="Search components..."
                    value={state.search.clone()}
                    oninput={on_search_input}
                    class="search-input"
                />
                if !state.search.trim().is_empty() {
                    <span class="search-count">{format!("{} matches", tree.matches.len())}</span>
                }
            </div>

            <div class="panel-body">
                <div class="component-tree">
                    if state.roots.is_empty() {
                        <p class="empty-state">{"No component tree yet."}</p>
                    } else {
                        <ul class="tree-root">
                            {for state.root_refs().map(|(at, root)| tree.node(root, at))}
                        </ul>
                    }
                </div>
                <div class="component-details">
                    {details(state.details())}
                </div>
            </div>

            <div class="footer">
                {format!("{} renderers • {} roots", state.renderers.len(), state.roots.len().max(state.roots_found))}
            </div>
        </div>
    }
}

struct TreeView<'a> {
    state: &'a PanelState,
    matches: BTreeSet<NodeRef>,
    on_select: Callback<NodeRef>,
    on_toggle: Callback<NodeRef>,
}

impl TreeView<'_> {
    fn node(&self, node: &SerializedNode, at: NodeRef) -> Html {
        let has_children = node.child.is_some();
        let collapsed = self.state.is_collapsed(&at);

        let mut class = classes!("tree-item");
        if self.state.selected.as_ref() == Some(&at) {
            class.push("selected");
        }
        if self.matches.contains(&at) {
            class.push("search-match");
        }

        let label = match &node.key {
            Some(key) => format!("{} (key: {})", node.display_name(), key),
            None => node.display_name(),
        };

        let onclick = {
            let (on_select, at) = (self.on_select.clone(), at.clone());
            Callback::from(move |_: MouseEvent| on_select.emit(at.clone()))
        };
        let ontoggle = {
            let (on_toggle, at) = (self.on_toggle.clone(), at.clone());
            Callback::from(move |e: MouseEvent| {
                e.stop_propagation();
                on_toggle.emit(at.clone());
            })
        };

        html! {
            <li>
                <div class={class} onclick={onclick}>
                    if has_children {
                        <button class="toggle-btn" onclick={ontoggle}>
                            {if collapsed { "+" } else { "-" }}
                        </button>
                    }
                    <span class="component-name">{label}</span>
                </div>
                if has_children && !collapsed {
                    <ul class="tree-children">
                        {for node.children().enumerate().map(|(index, child)| self.node(child, child_of(&at, index)))}
                    </ul>
                }
            </li>
        }
    }
}

fn child_of(at: &NodeRef, index: usize) -> NodeRef {
    let mut path = at.path.clone();
    path.push(index as u32);
    NodeRef { path, ..at.clone() }
}

fn details(node: Option<&SerializedNode>) -> Html {
    let Some(node) = node else {
        return html! {
            <p class="empty-state">{"Select a component to see details"}</p>
        };
    };

    html! {
        <div class="details">
            <h2 class="details-title">{node.display_name()}</h2>
            <p>{format!("Type: {}", type_label(node))}</p>
            <p>{format!("Key: {}", node.key.as_deref().unwrap_or("None"))}</p>
            <h3>{"Props"}</h3>
            <pre class="details-json">{pretty(&node.props)}</pre>
            <h3>{"State"}</h3>
            <pre class="details-json">{pretty(&node.state)}</pre>
        </div>
    }
}

fn type_label(node: &SerializedNode) -> String {
    match node.node_type.as_str() {
        Some(text) => text.to_string(),
        None => node.tag.map_or("Unknown", tag_label).to_string(),
    }
}

fn pretty(value: &SerializedValue) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("<unprintable: {}>", e))
}
