//! Integration service — runs the vendor integration of each managed device.
//!
//! Starting a device resolves its bundle, builds the device's connection
//! pool from its pool configuration and the bundle's dialer, and registers
//! the bundle's producer and consumer on the bus. The command builder is
//! kept to serve [`IntegrationService::dispatch`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use homelink_domain::command::Command;
use homelink_domain::device::Device;
use homelink_domain::error::{ConfigurationError, HubError, NotFoundError, UnsupportedError};
use homelink_domain::id::DeviceId;

use crate::connection_pool::ConnectionPool;
use crate::directory::{self, DeviceDirectory};
use crate::event_bus::{ConsumerId, InProcessEventBus, ProducerId};
use crate::ports::event_bus::EventPublisher;
use crate::ports::extension::{CommandBuilder, DeviceContext};
use crate::registry::ExtensionRegistry;

/// How long a command waits for a connection.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

struct RunningDevice {
    name: String,
    pool: Option<ConnectionPool>,
    builder: Option<Arc<dyn CommandBuilder>>,
    producer: Option<ProducerId>,
    consumer: Option<ConsumerId>,
}

pub struct IntegrationService {
    registry: Arc<ExtensionRegistry>,
    bus: InProcessEventBus,
    directory: DeviceDirectory,
    dispatch_timeout: Duration,
    running: Mutex<HashMap<DeviceId, RunningDevice>>,
}

impl IntegrationService {
    pub fn new(
        registry: Arc<ExtensionRegistry>,
        bus: InProcessEventBus,
        directory: DeviceDirectory,
    ) -> Self {
        Self {
            registry,
            bus,
            directory,
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
            running: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    fn running(&self) -> MutexGuard<'_, HashMap<DeviceId, RunningDevice>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn is_running(&self, id: DeviceId) -> bool {
        self.running().contains_key(&id)
    }

    /// Start the integration of one device. Starting a running device is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] for unknown devices,
    /// [`HubError::Unsupported`] when no extension claims the model, or
    /// [`HubError::Validation`] for an invalid pool configuration.
    #[tracing::instrument(skip(self))]
    pub fn start_device(&self, id: DeviceId) -> Result<(), HubError> {
        let mut running = self.running();
        if running.contains_key(&id) {
            tracing::debug!("integration already running");
            return Ok(());
        }
        let device = self.directory.get(id)?;
        let (name, model, pool_config) = {
            let d = directory::read(&device);
            (d.name.clone(), d.model.clone(), d.pool.clone())
        };
        let bundle = self.registry.require(&model)?;
        let dialer = bundle.dialer(&directory::read(&device));

        let pool = match (pool_config, dialer) {
            (Some(config), Some(dialer)) => Some(ConnectionPool::new(config, dialer)?),
            (None, Some(_)) => {
                tracing::warn!(device = %name, "no pool configured, device will not be contacted");
                None
            }
            (_, None) => None,
        };

        let ctx = DeviceContext {
            device,
            pool: pool.clone(),
            publisher: Arc::new(self.bus.clone()) as Arc<dyn EventPublisher>,
        };
        let events = bundle.events(&ctx).unwrap_or_default();
        let consumer = events.consumer.map(|c| self.bus.add_consumer(c));
        let producer = events.producer.map(|p| self.bus.add_producer(p));
        let builder = bundle.builder();

        tracing::info!(
            device = %name,
            extension = bundle.extension(),
            producing = producer.is_some(),
            consuming = consumer.is_some(),
            commands = builder.is_some(),
            "integration started"
        );
        running.insert(
            id,
            RunningDevice {
                name,
                pool,
                builder,
                producer,
                consumer,
            },
        );
        Ok(())
    }

    /// Start every managed device; failures are logged and skipped.
    ///
    /// Returns how many devices were started.
    pub fn start_all(&self) -> usize {
        let mut started = 0;
        for device in self.directory.list() {
            match self.start_device(device.id) {
                Ok(()) => started += 1,
                Err(err) => {
                    tracing::warn!(device = %device.name, %err, "cannot start integration");
                }
            }
        }
        started
    }

    /// Stop a device's producer, drain its consumer and close its pool.
    ///
    /// Returns `false` when the device was not running.
    #[tracing::instrument(skip(self))]
    pub async fn stop_device(&self, id: DeviceId) -> bool {
        let Some(running) = self.running().remove(&id) else {
            return false;
        };
        if let Some(producer) = running.producer {
            self.bus.remove_producer(producer).await;
        }
        if let Some(consumer) = running.consumer {
            self.bus.remove_consumer(consumer).await;
        }
        if let Some(pool) = &running.pool {
            pool.close();
        }
        tracing::info!(device = %running.name, "integration stopped");
        true
    }

    /// Stop the device's integration, then forget the device.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] when no device has this id.
    #[tracing::instrument(skip(self))]
    pub async fn remove_device(&self, id: DeviceId) -> Result<Device, HubError> {
        self.directory.get(id)?;
        self.stop_device(id).await;
        let shared = self.directory.remove(id).ok_or_else(|| NotFoundError {
            entity: "Device",
            id: id.to_string(),
        })?;
        let device = directory::read(&shared).clone();
        tracing::info!(device = %device.name, "device removed");
        Ok(device)
    }

    /// Send `command` to the device owning its target zone.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] when the zone is unknown or its device
    /// is not running, [`HubError::Unsupported`] when the model has no
    /// command builder, [`HubError::Configuration`] when the device has no
    /// pool, or the builder, lease and transport errors.
    #[tracing::instrument(skip(self, command), fields(command = %command))]
    pub async fn dispatch(&self, command: &Command) -> Result<(), HubError> {
        let zone_id = command.target().zone_id;
        let (device, _) = self.directory.find_zone(zone_id).ok_or_else(|| NotFoundError {
            entity: "Zone",
            id: zone_id.to_string(),
        })?;
        let (device_id, model) = {
            let d = directory::read(&device);
            (d.id, d.model.clone())
        };

        let (name, builder, pool) = {
            let running = self.running();
            let entry = running.get(&device_id).ok_or_else(|| NotFoundError {
                entity: "Integration",
                id: device_id.to_string(),
            })?;
            (entry.name.clone(), entry.builder.clone(), entry.pool.clone())
        };
        let builder = builder.ok_or_else(|| UnsupportedError {
            model,
            capability: "commands",
        })?;
        let pool = pool.ok_or_else(|| ConfigurationError::MissingPool(name.clone()))?;

        let wire = builder.build(command)?;
        let lease = pool.lease(self.dispatch_timeout, false).await?;
        let written = lease.write_all(&wire).await;
        lease.release(written.as_ref().err());
        written?;
        tracing::debug!(device = %name, "command sent");
        Ok(())
    }

    /// Stop every running integration, then shut the bus down.
    pub async fn shutdown(&self) {
        let ids: Vec<DeviceId> = self.running().keys().copied().collect();
        for id in ids {
            self.stop_device(id).await;
        }
        self.bus.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use homelink_domain::event::{Event, EventKind};
    use homelink_domain::id::ZoneId;
    use homelink_domain::zone::Zone;
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::ports::extension::{Bundle, DeviceEvents, EventConsumer, EventProducer};
    use crate::ports::transport::Dialer;
    use crate::testing::FakeDialer;

    struct TextBuilder;

    impl CommandBuilder for TextBuilder {
        fn build(&self, command: &Command) -> Result<Bytes, HubError> {
            Ok(Bytes::from(format!("{command}\r\n")))
        }

        fn parse(&self, _wire: &[u8], device: &Device) -> Result<Command, HubError> {
            Err(UnsupportedError {
                model: device.model.clone(),
                capability: "parse",
            }
            .into())
        }
    }

    #[derive(Default)]
    struct Flag(AtomicBool);

    #[async_trait]
    impl EventProducer for Flag {
        fn name(&self) -> &str {
            "flag"
        }

        fn start(&self) {
            self.0.store(true, Ordering::SeqCst);
        }

        async fn stop(&self) {
            self.0.store(false, Ordering::SeqCst);
        }
    }

    struct Silent;

    #[async_trait]
    impl EventConsumer for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        fn subscriptions(&self) -> &[EventKind] {
            &[EventKind::ZonesReportRequested]
        }

        async fn consume(&self, _batch: Vec<Event>) {}
    }

    struct TestBundle {
        dialer: Arc<FakeDialer>,
        producer: Arc<Flag>,
        commands: bool,
    }

    impl Bundle for TestBundle {
        fn extension(&self) -> &'static str {
            "test"
        }

        fn builder(&self) -> Option<Arc<dyn CommandBuilder>> {
            self.commands
                .then(|| Arc::new(TextBuilder) as Arc<dyn CommandBuilder>)
        }

        fn dialer(&self, _device: &Device) -> Option<Arc<dyn Dialer>> {
            Some(Arc::clone(&self.dialer) as Arc<dyn Dialer>)
        }

        fn events(&self, ctx: &DeviceContext) -> Option<DeviceEvents> {
            ctx.pool.as_ref()?;
            Some(DeviceEvents {
                producer: Some(Arc::clone(&self.producer) as Arc<dyn EventProducer>),
                consumer: Some(Arc::new(Silent)),
            })
        }
    }

    struct Fixture {
        service: IntegrationService,
        bus: InProcessEventBus,
        dialer: Arc<FakeDialer>,
        producer: Arc<Flag>,
        device_id: DeviceId,
        zone: Zone,
    }

    fn fixture(model: &str, commands: bool) -> Fixture {
        let dialer = Arc::new(FakeDialer::default());
        let producer = Arc::new(Flag::default());
        let mut registry = ExtensionRegistry::new();
        registry
            .register(
                &["test-1"],
                Arc::new(TestBundle {
                    dialer: Arc::clone(&dialer),
                    producer: Arc::clone(&producer),
                    commands,
                }),
            )
            .unwrap();

        let zone = Zone::builder().address("3").name("Kitchen").build().unwrap();
        let device = Device::builder()
            .name("Bridge")
            .model(model)
            .zone(zone.clone())
            .pool("bridge", 2)
            .build()
            .unwrap();
        let device_id = device.id;
        let directory = DeviceDirectory::new();
        directory.insert(device).unwrap();

        let bus = InProcessEventBus::default();
        let service = IntegrationService::new(Arc::new(registry), bus.clone(), directory);
        Fixture {
            service,
            bus,
            dialer,
            producer,
            device_id,
            zone,
        }
    }

    #[tokio::test]
    async fn should_register_producer_and_consumer_on_start() {
        let fx = fixture("test-1", true);
        fx.service.start_device(fx.device_id).unwrap();

        assert!(fx.service.is_running(fx.device_id));
        assert!(fx.producer.0.load(Ordering::SeqCst));
        assert_eq!(fx.bus.consumer_count(), 1);

        fx.service.start_device(fx.device_id).unwrap();
        assert_eq!(fx.bus.consumer_count(), 1);
    }

    #[tokio::test]
    async fn should_tear_down_on_stop() {
        let fx = fixture("test-1", true);
        fx.service.start_device(fx.device_id).unwrap();

        assert!(fx.service.stop_device(fx.device_id).await);

        assert!(!fx.producer.0.load(Ordering::SeqCst));
        assert_eq!(fx.bus.consumer_count(), 0);
        assert!(!fx.service.stop_device(fx.device_id).await);
    }

    #[tokio::test]
    async fn should_refuse_unsupported_model() {
        let fx = fixture("mystery", true);
        assert!(matches!(
            fx.service.start_device(fx.device_id),
            Err(HubError::Unsupported(_))
        ));
        assert_eq!(fx.service.start_all(), 0);
    }

    #[tokio::test]
    async fn should_write_built_command_to_device() {
        let fx = fixture("test-1", true);
        fx.service.start_device(fx.device_id).unwrap();

        let command = Command::set_level(&fx.zone, 40.0).unwrap();
        fx.service.dispatch(&command).await.unwrap();

        let mut device = fx.dialer.take_peer().unwrap();
        let mut buf = vec![0_u8; "set zone 3 to 40.00\r\n".len()];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, b"set zone 3 to 40.00\r\n");
    }

    #[tokio::test]
    async fn should_report_missing_builder_as_unsupported() {
        let fx = fixture("test-1", false);
        fx.service.start_device(fx.device_id).unwrap();

        let command = Command::ZoneTurnOn {
            target: (&fx.zone).into(),
        };
        assert!(matches!(
            fx.service.dispatch(&command).await,
            Err(HubError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn should_reject_command_for_unknown_zone_or_stopped_device() {
        let fx = fixture("test-1", true);
        let stray = Command::ZoneTurnOff {
            target: homelink_domain::command::ZoneTarget {
                zone_id: ZoneId::new(),
                address: "9".to_string(),
            },
        };
        assert!(matches!(
            fx.service.dispatch(&stray).await,
            Err(HubError::NotFound(_))
        ));

        let command = Command::ZoneTurnOff {
            target: (&fx.zone).into(),
        };
        assert!(matches!(
            fx.service.dispatch(&command).await,
            Err(HubError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn should_give_up_dispatch_after_configured_timeout() {
        let fx = fixture("test-1", true);
        let service = fx.service.with_dispatch_timeout(Duration::from_millis(50));
        service.start_device(fx.device_id).unwrap();
        let pool = service.running()[&fx.device_id].pool.clone().unwrap();
        let _held = [
            pool.lease(Duration::ZERO, true).await.unwrap(),
            pool.lease(Duration::ZERO, true).await.unwrap(),
        ];

        let command = Command::ZoneTurnOn {
            target: (&fx.zone).into(),
        };
        assert!(matches!(
            service.dispatch(&command).await,
            Err(HubError::Timeout(t)) if t == Duration::from_millis(50)
        ));
    }

    #[tokio::test]
    async fn should_stop_integration_when_device_is_removed() {
        let fx = fixture("test-1", true);
        fx.service.start_device(fx.device_id).unwrap();

        let removed = fx.service.remove_device(fx.device_id).await.unwrap();

        assert_eq!(removed.id, fx.device_id);
        assert!(!fx.service.is_running(fx.device_id));
        assert!(!fx.producer.0.load(Ordering::SeqCst));
        assert_eq!(fx.bus.consumer_count(), 0);
        let command = Command::ZoneTurnOff {
            target: (&fx.zone).into(),
        };
        assert!(matches!(
            fx.service.dispatch(&command).await,
            Err(HubError::NotFound(_))
        ));
        assert!(matches!(
            fx.service.remove_device(fx.device_id).await,
            Err(HubError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn should_stop_everything_on_shutdown() {
        let fx = fixture("test-1", true);
        assert_eq!(fx.service.start_all(), 1);

        fx.service.shutdown().await;

        assert!(!fx.service.is_running(fx.device_id));
        assert!(!fx.producer.0.load(Ordering::SeqCst));
    }
}
