use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use appointment_cell::handlers::AppointmentState;
use appointment_cell::services::{
    AppointmentBookingService, AppointmentLifecycleService, ConflictDetectionService,
    InMemoryStaffDirectory, RescheduleService, StaffDirectory, SupabaseStaffDirectory, TransferService,
};
use appointment_cell::store::{AppointmentStore, InMemoryAppointmentStore, SupabaseAppointmentStore};
use availability_cell::handlers::AvailabilityState;
use availability_cell::models::AvailabilityPolicy;
use availability_cell::services::{AvailabilityResolver, SlotService};
use availability_cell::store::{AvailabilityStore, InMemoryAvailabilityStore, SupabaseAvailabilityStore};
use billing_cell::handlers::BillingState;
use billing_cell::store::{BillingStore, InMemoryBillingStore, SupabaseBillingStore};
use billing_cell::{
    BillingService, CapacityCounter, InMemorySessionCounter, RedisSessionCounter, SessionCompletionService,
    SessionCounter, SupabaseSessionCounter,
};
use shared_config::{AppConfig, StoreBackend};
use shared_database::SupabaseClient;
use shared_utils::SystemClock;

/// Per-cell router state, all sharing the same stores.
pub struct AppState {
    pub availability: Arc<AvailabilityState>,
    pub appointments: Arc<AppointmentState>,
    pub billing: Arc<BillingState>,
}

struct Backends {
    availability: Arc<dyn AvailabilityStore>,
    appointments: Arc<dyn AppointmentStore>,
    directory: Arc<dyn StaffDirectory>,
    billing: Arc<dyn BillingStore>,
    supabase: Option<Arc<SupabaseClient>>,
}

fn backends(config: &AppConfig) -> Backends {
    match config.store_backend {
        StoreBackend::Memory => {
            warn!("Using in-memory stores; data is lost on restart");
            Backends {
                availability: Arc::new(InMemoryAvailabilityStore::new()),
                appointments: Arc::new(InMemoryAppointmentStore::new(config.scheduling.slot_minutes)),
                directory: Arc::new(InMemoryStaffDirectory::new()),
                billing: Arc::new(InMemoryBillingStore::new()),
                supabase: None,
            }
        }
        StoreBackend::Supabase => {
            let supabase = Arc::new(SupabaseClient::new(config));
            info!("Using Supabase stores at {}", supabase.get_base_url());
            Backends {
                availability: Arc::new(SupabaseAvailabilityStore::new(supabase.clone())),
                appointments: Arc::new(SupabaseAppointmentStore::new(supabase.clone())),
                directory: Arc::new(SupabaseStaffDirectory::new(supabase.clone())),
                billing: Arc::new(SupabaseBillingStore::new(supabase.clone())),
                supabase: Some(supabase),
            }
        }
    }
}

async fn session_counter(
    config: &AppConfig,
    supabase: Option<&Arc<SupabaseClient>>,
) -> anyhow::Result<Arc<dyn SessionCounter>> {
    if let Some(url) = &config.redis_url {
        return Ok(Arc::new(RedisSessionCounter::connect(url).await?));
    }

    Ok(match supabase {
        Some(client) => Arc::new(SupabaseSessionCounter::new(client.clone())),
        None => Arc::new(InMemorySessionCounter::new()),
    })
}

pub async fn build_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let backends = backends(config);
    let counter = session_counter(config, backends.supabase.as_ref()).await?;
    let scheduling = &config.scheduling;
    let debounce = Duration::from_millis(scheduling.conflict_debounce_ms);

    let resolver = Arc::new(AvailabilityResolver::new(
        backends.availability.clone(),
        AvailabilityPolicy::from_config(scheduling),
    ));
    let slots = Arc::new(SlotService::new(resolver.clone(), Arc::new(SystemClock)));
    let conflicts = Arc::new(ConflictDetectionService::new(
        backends.appointments.clone(),
        scheduling.slot_minutes,
    ));

    let booking = Arc::new(AppointmentBookingService::new(
        backends.appointments.clone(),
        backends.directory.clone(),
        resolver.clone(),
        conflicts.clone(),
        Arc::new(SystemClock),
    ));
    let lifecycle = Arc::new(AppointmentLifecycleService::new(backends.appointments.clone()));
    let reschedule = Arc::new(RescheduleService::new(
        backends.appointments.clone(),
        slots.clone(),
        conflicts.clone(),
        debounce,
    ));
    let transfer = Arc::new(TransferService::new(
        backends.appointments.clone(),
        backends.directory.clone(),
        resolver.clone(),
        conflicts.clone(),
        debounce,
    ));

    let capacity = CapacityCounter::new(counter, config.billing.capacity_threshold);
    let billing = Arc::new(BillingService::new(backends.billing.clone(), capacity, &config.billing));
    let completion = Arc::new(SessionCompletionService::new(
        backends.appointments.clone(),
        lifecycle.clone(),
        billing.clone(),
    ));

    Ok(AppState {
        availability: Arc::new(AvailabilityState { resolver }),
        appointments: Arc::new(AppointmentState {
            store: backends.appointments,
            slots,
            conflicts,
            booking,
            lifecycle,
            reschedule,
            transfer,
        }),
        billing: Arc::new(BillingState { billing, completion }),
    })
}
