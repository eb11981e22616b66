use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{info, trace, warn};
use nannou_osc as osc;

use super::events::{InboundMessage, RuntimeCommand, RuntimeCommandSender};
use super::gateway::INBOUND_TOPICS;
use super::status::StatusSink;

/// Listens for OSC packets on a background thread and forwards recognised
/// topics to the render loop. `/scene/set` with one string argument holding
/// JSON becomes topic `scene/set` with that payload.
pub struct OscTransport {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OscTransport {
    pub fn start(
        port: u16,
        command_tx: RuntimeCommandSender,
        connected: Arc<AtomicBool>,
    ) -> Result<Self, String> {
        let receiver = osc::Receiver::bind(port).map_err(|err| {
            format!("failed to bind OSC receiver on port {}: {}", port, err)
        })?;

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();

        let handle = thread::spawn(move || {
            while thread_running.load(Ordering::SeqCst) {
                let mut processed = false;

                for (packet, _) in receiver.try_iter() {
                    processed = true;
                    connected.store(true, Ordering::Release);

                    for message in packet.into_msgs() {
                        let Some(inbound) = to_inbound(&message) else {
                            continue;
                        };

                        if command_tx
                            .send(RuntimeCommand::Inbound(inbound))
                            .is_err()
                        {
                            info!("render loop is gone; stopping OSC receiver");
                            return;
                        }
                    }
                }

                if !processed {
                    thread::sleep(Duration::from_millis(1));
                }
            }

            info!("OSC receiver thread on port {} is exiting", port);
        });

        info!("OSC receiver listening on port {}", port);

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }
}

impl Drop for OscTransport {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn to_inbound(message: &osc::Message) -> Option<InboundMessage> {
    let topic = message.addr.trim_start_matches('/');

    if !INBOUND_TOPICS.contains(&topic) {
        warn!("ignoring OSC message on unknown address '{}'", message.addr);
        return None;
    }

    let payload = match message.args.first() {
        Some(osc::Type::String(payload)) => payload.clone(),
        None => String::new(),
        Some(other) => {
            warn!(
                "ignoring '{}': expected a JSON string argument, got {:?}",
                message.addr, other
            );
            return None;
        }
    };

    trace!("OSC {} {}", topic, payload);
    Some(InboundMessage::new(topic, payload))
}

/// Sends status as `/<topic>` with the JSON document as a string argument.
pub struct OscStatusSink {
    sender: osc::Sender,
    target: SocketAddr,
}

impl OscStatusSink {
    pub fn connect(addr: &str) -> Result<Self, String> {
        let target: SocketAddr = addr
            .parse()
            .map_err(|err| format!("invalid status address '{}': {}", addr, err))?;
        let sender = osc::sender()
            .map_err(|err| format!("failed to create OSC sender: {}", err))?;

        info!("publishing status over OSC to {}", target);
        Ok(Self { sender, target })
    }
}

impl StatusSink for OscStatusSink {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), String> {
        let packet = osc::Packet::Message(osc::Message {
            addr: format!("/{}", topic),
            args: vec![osc::Type::String(payload.to_string())],
        });

        self.sender
            .send(packet, self.target)
            .map(|_| ())
            .map_err(|err| err.to_string())
    }
}
