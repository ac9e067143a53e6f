//! Demonstration control collaborator. It consumes the bus topics the core
//! publishes, routes the server's commands, and answers through the outbound
//! gateway. Hardware-backed commands (LEDs, alarms) live in their own
//! collaborators; this one only carries the state it can honestly report.

use serde_json::json;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::bus::{Bus, Event, Topic};
use crate::envelope::{self, Command, Inbound, Outbound};
use crate::link::Gateway;

pub struct Control {
    bus: Bus,
    gateway: Gateway,
    led_on: bool,
    started: Instant,
}

impl Control {
    pub fn new(bus: Bus, gateway: Gateway) -> Self {
        Self {
            bus,
            gateway,
            led_on: false,
            started: Instant::now(),
        }
    }

    /// Routes inbound commands until the server requests a restart. Returning
    /// ends the process via the race in `main`.
    pub async fn run(mut self) {
        let mut opened = self.bus.subscribe(Topic::Opened);
        let mut messages = self.bus.subscribe(Topic::Message);
        let mut led_changes = self.bus.subscribe(Topic::LedStatus);

        loop {
            tokio::select! {
                event = opened.recv() => match event {
                    // Push a status report on every (re)connect
                    Some(_) => self.gateway.send(&Outbound::status(self.status())),
                    None => return,
                },
                event = led_changes.recv() => match event {
                    // Announced LED changes are forwarded upstream
                    Some(Event::LedStatus(on)) => self.gateway.send(&Outbound::led_status(on)),
                    Some(_) => {}
                    None => return,
                },
                event = messages.recv() => match event {
                    Some(Event::Message(raw)) => {
                        if !self.handle(&raw) {
                            info!("restart requested by the control server");
                            return;
                        }
                    }
                    Some(_) => {}
                    None => return,
                },
            }
        }
    }

    /// Handles one screened frame. Returns `false` when the task should stop.
    fn handle(&mut self, raw: &str) -> bool {
        match envelope::parse(raw) {
            Ok(Inbound::Command(Command::Status)) => {
                self.gateway.send(&Outbound::status(self.status()))
            }
            Ok(Inbound::Command(Command::LedStatus)) => {
                self.gateway.send(&Outbound::led_status(self.led_on))
            }
            Ok(Inbound::Command(Command::Lighton)) => self.set_led(true),
            Ok(Inbound::Command(Command::Lightoff)) => self.set_led(false),
            Ok(Inbound::Command(Command::Restart)) => return false,
            Ok(Inbound::Command(Command::Unknown)) => {
                debug!(frame = raw, "ignoring unknown command")
            }
            Ok(Inbound::Error(error)) => {
                warn!(code = error.code, message = %error.message, "server reported an error")
            }
            Err(error) => warn!(%error, "discarding unparseable envelope"),
        }
        true
    }

    fn set_led(&mut self, on: bool) {
        self.led_on = on;
        info!(on, "led state changed");
        self.bus.publish(Event::LedStatus(on));
    }

    fn status(&self) -> serde_json::Value {
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "uptime": self.started.elapsed().as_secs(),
            "led": self.led_on,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Credentials, LinkConfig};
    use crate::link::testutil::WsHarness;
    use crate::link::Uplink;
    use mockito::Server;
    use serde_json::Value;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_lighton_sets_led_and_announces_on_the_bus() {
        let bus = Bus::new();
        let mut announced = bus.subscribe(Topic::LedStatus);
        let mut control = Control::new(bus, Gateway::detached());

        assert!(control.handle(r#"{"data":{"name":"lighton"}}"#));
        assert!(control.led_on);
        assert!(control.handle(r#"{"data":{"name":"lightoff"}}"#));
        assert!(!control.led_on);

        assert_eq!(announced.recv().await, Some(Event::LedStatus(true)));
        assert_eq!(announced.recv().await, Some(Event::LedStatus(false)));
    }

    #[test]
    fn test_restart_stops_the_task() {
        let mut control = Control::new(Bus::new(), Gateway::detached());
        assert!(!control.handle(r#"{"data":{"name":"restart"}}"#));
    }

    #[test]
    fn test_unknown_and_error_envelopes_are_ignored() {
        let mut control = Control::new(Bus::new(), Gateway::detached());
        assert!(control.handle(r#"{"data":{"name":"addAlarm","body":{"hour":7}}}"#));
        assert!(control.handle(r#"{"error":{"message":"unauthorized","code":401}}"#));
        assert!(!control.led_on);
    }

    /// Full loop: server command in, gateway reply out
    #[tokio::test]
    async fn test_round_trip_command_handling() {
        let mut auth = Server::new_async().await;
        let _mock = auth
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"response": "tok123"}"#)
            .create_async()
            .await;
        let mut harness = WsHarness::start().await;

        let config = LinkConfig {
            credentials: Credentials {
                server_address: harness.url().to_string(),
                api_key: "test-key".to_string(),
                password: "test-pass".to_string(),
                auth_endpoint: auth.url(),
            },
            auth_timeout: Duration::from_secs(5),
            reconnect_base: Duration::from_millis(50),
            reconnect_escalated: Duration::from_millis(200),
            stall_timeout: Duration::from_secs(5),
        };

        let bus = Bus::new();
        let uplink = Uplink::new(config, bus.clone());
        let control = Control::new(bus, uplink.gateway());
        // The collaborator must be subscribed before the link can open
        let control_task = tokio::spawn(control.run());
        tokio::task::yield_now().await;
        let _uplink_task = tokio::spawn(uplink.run());

        let mut session = harness.accept().await;

        // The collaborator pushes one status report on connect
        let pushed: Value = serde_json::from_str(&session.next_text().await.unwrap()).unwrap();
        assert_eq!(pushed["data"]["name"], "status");
        assert_eq!(pushed["cache"], true);
        assert_eq!(pushed["data"]["data"]["led"], false);

        // lighton: the LED change is announced and forwarded upstream
        session.send_text(r#"{"data":{"name":"lighton"}}"#).await;
        let forwarded: Value = serde_json::from_str(&session.next_text().await.unwrap()).unwrap();
        assert_eq!(
            forwarded,
            serde_json::json!({"data": {"name": "ledStatus", "data": true}})
        );

        // ledStatus: replies with the current state
        session.send_text(r#"{"data":{"name":"ledStatus"}}"#).await;
        let reply: Value = serde_json::from_str(&session.next_text().await.unwrap()).unwrap();
        assert_eq!(
            reply,
            serde_json::json!({"data": {"name": "ledStatus", "data": true}})
        );

        // restart: the control task finishes
        session.send_text(r#"{"data":{"name":"restart"}}"#).await;
        timeout(Duration::from_secs(5), control_task)
            .await
            .expect("control task should stop on restart")
            .unwrap();
    }
}
