use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, MqttOptions, Packet, QoS, TlsConfiguration, Transport,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::config::BrokerSettings;
use crate::error::CadenceError;
use crate::record::MessageRecord;
use crate::replay::MessageSink;

/// Pause between reconnect attempts after the broker drops the link.
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

/// Event-loop channel capacity for both client directions.
const EVENTLOOP_CAPACITY: usize = 128;

fn qos_from_u8(level: u8) -> QoS {
    match level {
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

fn mqtt_options(
    settings: &BrokerSettings,
    default_client_id: &str,
) -> Result<MqttOptions, CadenceError> {
    let client_id = if settings.client_id.is_empty() {
        default_client_id
    } else {
        settings.client_id.as_str()
    };

    let mut options = MqttOptions::new(client_id, settings.host.as_str(), settings.port);
    options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs.max(5)));
    if !settings.username.is_empty() {
        options.set_credentials(settings.username.as_str(), settings.password.as_str());
    }

    if settings.tls {
        let tls = if settings.validate_certificate {
            TlsConfiguration::Native
        } else {
            // Self-signed брокеры: отключаем проверку сертификата и имени.
            let connector = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .map_err(|e| CadenceError::Connect(format!("tls connector: {e}")))?;
            TlsConfiguration::NativeConnector(connector)
        };
        options.set_transport(Transport::Tls(tls));
    }

    Ok(options)
}

// ════════════════════════════════════════════════════════════════
//  Capture side (subscribe)
// ════════════════════════════════════════════════════════════════

/// Run the subscribe-side event loop until `token` fires or the recorder
/// drops its end of the channel.
///
/// Every incoming publish is stamped here, at the moment of delivery, and
/// sent into `tx`; a full channel pushes back on the broker connection
/// instead of dropping records. A transport drop after the first CONNACK
/// is survived: keep the session, retry, re-subscribe. A failure before
/// the first CONNACK is a fatal connect error.
pub async fn run_capture(
    settings: BrokerSettings,
    tx: mpsc::Sender<MessageRecord>,
    token: CancellationToken,
) -> Result<(), CadenceError> {
    let options = mqtt_options(&settings, "cadence-record")?;
    let (client, mut eventloop) = AsyncClient::new(options, EVENTLOOP_CAPACITY);
    let mut connected_once = false;

    loop {
        tokio::select! {
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(CadenceError::Connect(format!(
                            "broker refused connection: {:?}",
                            ack.code
                        )));
                    }
                    if connected_once {
                        tracing::info!(host = %settings.host, "reconnected to broker");
                    } else {
                        tracing::info!(host = %settings.host, port = settings.port, "connected to broker");
                        connected_once = true;
                    }
                    // (Re-)subscribe: the broker does not keep our
                    // subscription across a clean reconnect.
                    client
                        .subscribe(settings.topic_filter.as_str(), QoS::AtMostOnce)
                        .await
                        .map_err(|e| {
                            CadenceError::Connect(format!(
                                "subscribe '{}': {e}",
                                settings.topic_filter
                            ))
                        })?;
                    tracing::info!(filter = %settings.topic_filter, "subscribed");
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let record = MessageRecord::captured_now(
                        publish.topic.as_str(),
                        &publish.payload,
                        publish.qos as u8,
                        publish.retain,
                    );
                    if tx.send(record).await.is_err() {
                        // Recorder is gone; nothing left to capture for.
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    if !connected_once {
                        return Err(CadenceError::Connect(format!(
                            "{}:{}: {e}",
                            settings.host, settings.port
                        )));
                    }
                    tracing::warn!(error = %e, "broker connection lost, retrying");
                    tokio::time::sleep(RECONNECT_PAUSE).await;
                }
            },
            _ = token.cancelled() => break,
        }
    }

    let _ = client.disconnect().await;
    Ok(())
}

// ════════════════════════════════════════════════════════════════
//  Publish side (replay)
// ════════════════════════════════════════════════════════════════

/// Broker client for the replay path. The event loop runs on a driver
/// task; a transport failure there surfaces on the next `publish` so the
/// scheduler can abort instead of silently skipping messages.
pub struct MqttPublisher {
    client: AsyncClient,
    err_rx: watch::Receiver<Option<String>>,
    driver: tokio::task::JoinHandle<()>,
}

impl MqttPublisher {
    /// Connect and wait for the broker's CONNACK before returning.
    pub async fn connect(settings: &BrokerSettings) -> Result<Self, CadenceError> {
        let options = mqtt_options(settings, "cadence-replay")?;
        let (client, mut eventloop) = AsyncClient::new(options, EVENTLOOP_CAPACITY);

        let (err_tx, err_rx) = watch::channel(None);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();

        let driver = tokio::spawn(async move {
            let mut ready_tx = Some(ready_tx);
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        let result = if ack.code == ConnectReturnCode::Success {
                            Ok(())
                        } else {
                            Err(format!("broker refused connection: {:?}", ack.code))
                        };
                        if let Some(tx) = ready_tx.take() {
                            let failed = result.is_err();
                            let _ = tx.send(result);
                            if failed {
                                return;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if let Some(tx) = ready_tx.take() {
                            let _ = tx.send(Err(e.to_string()));
                        } else {
                            let _ = err_tx.send(Some(e.to_string()));
                        }
                        // No reconnect on the publish side: replay aborts
                        // rather than skip messages.
                        return;
                    }
                }
            }
        });

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(detail)) => {
                return Err(CadenceError::Connect(format!(
                    "{}:{}: {detail}",
                    settings.host, settings.port
                )));
            }
            Err(_) => {
                return Err(CadenceError::Connect(format!(
                    "{}:{}: event loop stopped before CONNACK",
                    settings.host, settings.port
                )));
            }
        }
        tracing::info!(host = %settings.host, port = settings.port, "connected to broker");

        Ok(Self {
            client,
            err_rx,
            driver,
        })
    }

    pub async fn disconnect(self) {
        let _ = self.client.disconnect().await;
        self.driver.abort();
        let _ = self.driver.await;
    }
}

impl MessageSink for MqttPublisher {
    async fn publish(&mut self, record: &MessageRecord) -> Result<(), CadenceError> {
        if let Some(detail) = self.err_rx.borrow().clone() {
            return Err(CadenceError::Publish(format!(
                "broker connection lost: {detail}"
            )));
        }
        self.client
            .publish(
                record.topic.as_str(),
                qos_from_u8(record.qos.unwrap_or(0)),
                record.retain.unwrap_or(false),
                record.payload.clone().into_bytes(),
            )
            .await
            .map_err(|e| CadenceError::Publish(format!("{}: {e}", record.topic)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_levels_map_with_fallback() {
        assert_eq!(qos_from_u8(0), QoS::AtMostOnce);
        assert_eq!(qos_from_u8(1), QoS::AtLeastOnce);
        assert_eq!(qos_from_u8(2), QoS::ExactlyOnce);
        // Junk in a hand-edited recording falls back to the default.
        assert_eq!(qos_from_u8(7), QoS::AtMostOnce);
    }
}
