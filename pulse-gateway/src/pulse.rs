//! Real gateway implementation over libpulse
//!
//! libpulse's mainloop is not thread-safe (it is built on `Rc` internally),
//! so the connection lives on a dedicated worker thread that owns the
//! threaded mainloop and context. The public `PulseClient` handle forwards
//! each call over a command channel and blocks on the reply, giving the
//! rest of the system a plain synchronous, `Send` client.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use libpulse_binding::callbacks::ListResult;
use libpulse_binding::context::{Context, FlagSet as ContextFlagSet, State};
use libpulse_binding::mainloop::threaded::Mainloop;
use libpulse_binding::proplist::{properties, Proplist};

use crate::error::GatewayError;
use crate::types::{CardInfo, CardProfile, ModuleInfo, ServerInfo, SinkInfo, SourceInfo};
use crate::{render_module_args, Gateway};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const INVALID_INDEX: u32 = u32::MAX;

/// Commands forwarded from the handle to the worker thread
enum PulseCommand {
    Sources(mpsc::Sender<Result<Vec<SourceInfo>, GatewayError>>),
    Sinks(mpsc::Sender<Result<Vec<SinkInfo>, GatewayError>>),
    Modules(mpsc::Sender<Result<Vec<ModuleInfo>, GatewayError>>),
    Cards(mpsc::Sender<Result<Vec<CardInfo>, GatewayError>>),
    Server(mpsc::Sender<Result<ServerInfo, GatewayError>>),
    LoadModule {
        name: String,
        argument: String,
        reply: mpsc::Sender<Result<u32, GatewayError>>,
    },
    UnloadModule {
        index: u32,
        reply: mpsc::Sender<Result<(), GatewayError>>,
    },
    SetDefaultSource {
        name: String,
        reply: mpsc::Sender<Result<(), GatewayError>>,
    },
    SetCardProfile {
        card: String,
        profile: String,
        reply: mpsc::Sender<Result<(), GatewayError>>,
    },
    Shutdown,
}

/// Messages produced by a list-style introspection callback
enum ListMsg<T> {
    Item(T),
    End,
    Error,
}

/// Synchronous PulseAudio client backed by a worker thread
///
/// Created connected; dropping the handle disconnects. Calls are not
/// meant to be issued concurrently - callers serialize with their own
/// guard, matching the engine's concurrency discipline.
pub struct PulseClient {
    command_tx: mpsc::Sender<PulseCommand>,
    _worker: JoinHandle<()>,
}

impl PulseClient {
    /// Connect to the local default server, identifying as `app_name`
    pub fn connect(app_name: &str) -> Result<Self, GatewayError> {
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let app_name = app_name.to_string();

        let worker = thread::Builder::new()
            .name("pulse-gateway".to_string())
            .spawn(move || {
                // The mainloop must be created inside the thread that
                // will own it.
                match PulseBackend::connect(&app_name) {
                    Ok(mut backend) => {
                        let _ = ready_tx.send(Ok(()));
                        backend.run(command_rx);
                        backend.disconnect();
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| GatewayError::Connect(format!("failed to spawn worker: {e}")))?;

        ready_rx
            .recv()
            .map_err(|_| GatewayError::Disconnected)??;

        tracing::debug!("connected to pulseaudio server");
        Ok(Self {
            command_tx,
            _worker: worker,
        })
    }

    fn request<T>(
        &self,
        build: impl FnOnce(mpsc::Sender<Result<T, GatewayError>>) -> PulseCommand,
    ) -> Result<T, GatewayError> {
        let (tx, rx) = mpsc::channel();
        self.command_tx
            .send(build(tx))
            .map_err(|_| GatewayError::Disconnected)?;
        rx.recv().map_err(|_| GatewayError::Disconnected)?
    }
}

impl Gateway for PulseClient {
    fn source_info_list(&self) -> Result<Vec<SourceInfo>, GatewayError> {
        self.request(PulseCommand::Sources)
    }

    fn sink_info_list(&self) -> Result<Vec<SinkInfo>, GatewayError> {
        self.request(PulseCommand::Sinks)
    }

    fn module_info_list(&self) -> Result<Vec<ModuleInfo>, GatewayError> {
        self.request(PulseCommand::Modules)
    }

    fn card_info_list(&self) -> Result<Vec<CardInfo>, GatewayError> {
        self.request(PulseCommand::Cards)
    }

    fn server_info(&self) -> Result<ServerInfo, GatewayError> {
        self.request(PulseCommand::Server)
    }

    fn load_module(&self, name: &str, args: &[(&str, &str)]) -> Result<u32, GatewayError> {
        let name = name.to_string();
        let argument = render_module_args(args);
        self.request(move |reply| PulseCommand::LoadModule {
            name,
            argument,
            reply,
        })
    }

    fn unload_module(&self, index: u32) -> Result<(), GatewayError> {
        self.request(move |reply| PulseCommand::UnloadModule { index, reply })
    }

    fn set_default_source(&self, name: &str) -> Result<(), GatewayError> {
        let name = name.to_string();
        self.request(move |reply| PulseCommand::SetDefaultSource { name, reply })
    }

    fn set_card_profile(&self, card: &str, profile: &str) -> Result<(), GatewayError> {
        let card = card.to_string();
        let profile = profile.to_string();
        self.request(move |reply| PulseCommand::SetCardProfile {
            card,
            profile,
            reply,
        })
    }
}

impl Drop for PulseClient {
    fn drop(&mut self) {
        let _ = self.command_tx.send(PulseCommand::Shutdown);
    }
}

/// Worker-side state: the threaded mainloop and connected context
///
/// Field order matters: the context must drop before the mainloop.
struct PulseBackend {
    context: Context,
    mainloop: Mainloop,
}

impl PulseBackend {
    fn connect(app_name: &str) -> Result<Self, GatewayError> {
        let mut proplist = Proplist::new()
            .ok_or_else(|| GatewayError::Connect("failed to create proplist".to_string()))?;
        proplist
            .set_str(properties::APPLICATION_NAME, app_name)
            .map_err(|_| GatewayError::Connect("failed to set application name".to_string()))?;

        let mut mainloop = Mainloop::new()
            .ok_or_else(|| GatewayError::Connect("failed to create mainloop".to_string()))?;

        let mut context = Context::new_with_proplist(&mainloop, app_name, &proplist)
            .ok_or_else(|| GatewayError::Connect("failed to create context".to_string()))?;

        context
            .connect(None, ContextFlagSet::NOFLAGS, None)
            .map_err(|e| GatewayError::Connect(format!("connect failed: {e}")))?;
        mainloop
            .start()
            .map_err(|e| GatewayError::Connect(format!("mainloop start failed: {e}")))?;

        // Wait for the context to become ready
        let start = Instant::now();
        loop {
            match context.get_state() {
                State::Ready => break,
                State::Failed | State::Terminated => {
                    return Err(GatewayError::Connect(
                        "context connection failed".to_string(),
                    ));
                }
                _ => {
                    if start.elapsed() > CONNECT_TIMEOUT {
                        return Err(GatewayError::Connect(
                            "timeout waiting for the server".to_string(),
                        ));
                    }
                    thread::sleep(Duration::from_millis(50));
                }
            }
        }

        Ok(Self { mainloop, context })
    }

    fn run(&mut self, command_rx: mpsc::Receiver<PulseCommand>) {
        while let Ok(command) = command_rx.recv() {
            match command {
                PulseCommand::Sources(reply) => {
                    let _ = reply.send(self.sources());
                }
                PulseCommand::Sinks(reply) => {
                    let _ = reply.send(self.sinks());
                }
                PulseCommand::Modules(reply) => {
                    let _ = reply.send(self.modules());
                }
                PulseCommand::Cards(reply) => {
                    let _ = reply.send(self.cards());
                }
                PulseCommand::Server(reply) => {
                    let _ = reply.send(self.server());
                }
                PulseCommand::LoadModule {
                    name,
                    argument,
                    reply,
                } => {
                    let _ = reply.send(self.load_module(&name, &argument));
                }
                PulseCommand::UnloadModule { index, reply } => {
                    let _ = reply.send(self.unload_module(index));
                }
                PulseCommand::SetDefaultSource { name, reply } => {
                    let _ = reply.send(self.set_default_source(&name));
                }
                PulseCommand::SetCardProfile {
                    card,
                    profile,
                    reply,
                } => {
                    let _ = reply.send(self.set_card_profile(&card, &profile));
                }
                PulseCommand::Shutdown => break,
            }
        }
    }

    fn disconnect(&mut self) {
        self.mainloop.lock();
        self.context.disconnect();
        self.mainloop.unlock();
        self.mainloop.stop();
        tracing::debug!("disconnected from pulseaudio server");
    }

    fn sources(&mut self) -> Result<Vec<SourceInfo>, GatewayError> {
        self.mainloop.lock();
        let introspect = self.context.introspect();
        let (tx, rx) = mpsc::channel();
        introspect.get_source_info_list(move |res| match res {
            ListResult::Item(item) => {
                let _ = tx.send(ListMsg::Item(SourceInfo {
                    index: item.index,
                    name: item.name.as_ref().map(|s| s.to_string()).unwrap_or_default(),
                    description: item.description.as_ref().map(|s| s.to_string()),
                }));
            }
            ListResult::End => {
                let _ = tx.send(ListMsg::End);
            }
            ListResult::Error => {
                let _ = tx.send(ListMsg::Error);
            }
        });
        self.mainloop.unlock();
        drain(rx, "source list query failed")
    }

    fn sinks(&mut self) -> Result<Vec<SinkInfo>, GatewayError> {
        self.mainloop.lock();
        let introspect = self.context.introspect();
        let (tx, rx) = mpsc::channel();
        introspect.get_sink_info_list(move |res| match res {
            ListResult::Item(item) => {
                let _ = tx.send(ListMsg::Item(SinkInfo {
                    index: item.index,
                    name: item.name.as_ref().map(|s| s.to_string()).unwrap_or_default(),
                    description: item.description.as_ref().map(|s| s.to_string()),
                }));
            }
            ListResult::End => {
                let _ = tx.send(ListMsg::End);
            }
            ListResult::Error => {
                let _ = tx.send(ListMsg::Error);
            }
        });
        self.mainloop.unlock();
        drain(rx, "sink list query failed")
    }

    fn modules(&mut self) -> Result<Vec<ModuleInfo>, GatewayError> {
        self.mainloop.lock();
        let introspect = self.context.introspect();
        let (tx, rx) = mpsc::channel();
        introspect.get_module_info_list(move |res| match res {
            ListResult::Item(item) => {
                let _ = tx.send(ListMsg::Item(ModuleInfo {
                    index: item.index,
                    name: item.name.as_ref().map(|s| s.to_string()).unwrap_or_default(),
                    argument: item.argument.as_ref().map(|s| s.to_string()),
                }));
            }
            ListResult::End => {
                let _ = tx.send(ListMsg::End);
            }
            ListResult::Error => {
                let _ = tx.send(ListMsg::Error);
            }
        });
        self.mainloop.unlock();
        drain(rx, "module list query failed")
    }

    fn cards(&mut self) -> Result<Vec<CardInfo>, GatewayError> {
        self.mainloop.lock();
        let introspect = self.context.introspect();
        let (tx, rx) = mpsc::channel();
        introspect.get_card_info_list(move |res| match res {
            ListResult::Item(item) => {
                let profiles = item
                    .profiles
                    .iter()
                    .map(|p| CardProfile {
                        name: p.name.as_ref().map(|s| s.to_string()).unwrap_or_default(),
                        description: p.description.as_ref().map(|s| s.to_string()),
                    })
                    .collect();
                let _ = tx.send(ListMsg::Item(CardInfo {
                    index: item.index,
                    name: item.name.as_ref().map(|s| s.to_string()).unwrap_or_default(),
                    profiles,
                    active_profile: item
                        .active_profile
                        .as_ref()
                        .and_then(|p| p.name.as_ref().map(|s| s.to_string())),
                }));
            }
            ListResult::End => {
                let _ = tx.send(ListMsg::End);
            }
            ListResult::Error => {
                let _ = tx.send(ListMsg::Error);
            }
        });
        self.mainloop.unlock();
        drain(rx, "card list query failed")
    }

    fn server(&mut self) -> Result<ServerInfo, GatewayError> {
        self.mainloop.lock();
        let introspect = self.context.introspect();
        let (tx, rx) = mpsc::channel();
        introspect.get_server_info(move |info| {
            let _ = tx.send(ServerInfo {
                server_name: info.server_name.as_ref().map(|s| s.to_string()),
                server_version: info.server_version.as_ref().map(|s| s.to_string()),
                default_source_name: info.default_source_name.as_ref().map(|s| s.to_string()),
                default_sink_name: info.default_sink_name.as_ref().map(|s| s.to_string()),
            });
        });
        self.mainloop.unlock();
        rx.recv()
            .map_err(|_| GatewayError::Call("server info query failed".to_string()))
    }

    fn load_module(&mut self, name: &str, argument: &str) -> Result<u32, GatewayError> {
        self.mainloop.lock();
        let mut introspect = self.context.introspect();
        let (tx, rx) = mpsc::channel();
        introspect.load_module(name, argument, move |index| {
            let _ = tx.send(index);
        });
        self.mainloop.unlock();

        let index = rx
            .recv()
            .map_err(|_| GatewayError::Call(format!("load of {name} failed")))?;
        if index == INVALID_INDEX {
            return Err(GatewayError::Call(format!("server refused to load {name}")));
        }
        tracing::debug!(module = name, index, "loaded module");
        Ok(index)
    }

    fn unload_module(&mut self, index: u32) -> Result<(), GatewayError> {
        self.mainloop.lock();
        let mut introspect = self.context.introspect();
        let (tx, rx) = mpsc::channel();
        introspect.unload_module(index, move |success| {
            let _ = tx.send(success);
        });
        self.mainloop.unlock();

        if rx.recv().unwrap_or(false) {
            tracing::debug!(index, "unloaded module");
            Ok(())
        } else {
            Err(GatewayError::Call(format!("unload of module {index} failed")))
        }
    }

    fn set_default_source(&mut self, name: &str) -> Result<(), GatewayError> {
        self.mainloop.lock();
        let (tx, rx) = mpsc::channel();
        self.context.set_default_source(name, move |success| {
            let _ = tx.send(success);
        });
        self.mainloop.unlock();

        if rx.recv().unwrap_or(false) {
            Ok(())
        } else {
            Err(GatewayError::Call(format!(
                "failed to set default source to {name}"
            )))
        }
    }

    fn set_card_profile(&mut self, card: &str, profile: &str) -> Result<(), GatewayError> {
        self.mainloop.lock();
        let mut introspect = self.context.introspect();
        let (tx, rx) = mpsc::channel();
        introspect.set_card_profile_by_name(
            card,
            profile,
            Some(Box::new(move |success| {
                let _ = tx.send(success);
            })),
        );
        self.mainloop.unlock();

        if rx.recv().unwrap_or(false) {
            tracing::debug!(card, profile, "switched card profile");
            Ok(())
        } else {
            Err(GatewayError::Call(format!(
                "failed to set profile {profile} on card {card}"
            )))
        }
    }
}

fn drain<T>(rx: mpsc::Receiver<ListMsg<T>>, context: &str) -> Result<Vec<T>, GatewayError> {
    let mut out = Vec::new();
    loop {
        match rx.recv() {
            Ok(ListMsg::Item(item)) => out.push(item),
            Ok(ListMsg::End) => return Ok(out),
            Ok(ListMsg::Error) | Err(_) => {
                return Err(GatewayError::Call(context.to_string()));
            }
        }
    }
}
