//! Telematics data: odometer and fuel level.
//!
//! All telematics share one service grant. A request names the data types the
//! caller is interested in; the SORC answers with a JSON object holding every
//! reading it has, and the manager picks the requested ones out of it.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tacs_core::service_grant::{
    ServiceGrantAction, ServiceGrantChange, ServiceGrantResponse, ServiceGrantStatus,
};
use tacs_proto::ServiceGrantId;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{
    ChangeSubject, Consumption, ServiceGrantConsumer, ServiceGrantRequester, SubjectConfig,
    vehicle_access::KEY_DESTROYED,
};

/// Service grant id for telematics.
pub const TELEMATICS_SERVICE_GRANT_ID: ServiceGrantId = 0x09;

/// Kind of telematics reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TelematicsDataType {
    /// Total distance
    Odometer,
    /// Fuel level in volume units
    FuelLevelAbsolute,
    /// Fuel level relative to tank size
    FuelLevelPercentage,
}

/// One reading reported by the vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelematicsData {
    /// What was measured
    pub data_type: TelematicsDataType,
    /// Measured value
    pub value: f64,
    /// Unit of `value`, as sent by the vehicle
    pub unit: String,
    /// When the vehicle took the reading, as sent by the vehicle
    pub timestamp: String,
}

/// Why a reading is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelematicsDataError {
    /// Vehicle does not report this type
    NotSupported,
    /// Lease does not allow telematics right now
    Denied,
    /// SORC destroyed its key for this lease
    KeyDestroyed,
    /// SORC could not read the data
    RemoteFailed,
}

/// Outcome for one requested type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelematicsDataResponse {
    /// Reading available
    Success(TelematicsData),
    /// Reading unavailable
    Failure {
        /// Requested type
        data_type: TelematicsDataType,
        /// Reason
        error: TelematicsDataError,
    },
}

/// What happened to a telematics request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelematicsDataAction {
    /// Snapshot for new subscribers
    Initial,
    /// Request went out (`accepted`) or was refused
    RequestingData {
        /// Types of the acknowledged request
        types: Vec<TelematicsDataType>,
        /// Whether the request went out
        accepted: bool,
    },
    /// Final response arrived; one entry per requested type
    ResponseReceived(Vec<TelematicsDataResponse>),
    /// Session ended; all requests dropped
    Reset,
}

/// Published by the telematics manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelematicsDataChange {
    /// Types awaiting a response, in request order without duplicates
    pub state: Vec<TelematicsDataType>,
    /// What happened
    pub action: TelematicsDataAction,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct Readings {
    odometer: Option<Reading>,
    fuel_level_absolute: Option<Reading>,
    fuel_level_percentage: Option<Reading>,
}

#[derive(Debug, Clone, Deserialize)]
struct Reading {
    value: f64,
    unit: String,
    timestamp: String,
}

impl Readings {
    fn get(&self, data_type: TelematicsDataType) -> Option<&Reading> {
        match data_type {
            TelematicsDataType::Odometer => self.odometer.as_ref(),
            TelematicsDataType::FuelLevelAbsolute => self.fuel_level_absolute.as_ref(),
            TelematicsDataType::FuelLevelPercentage => self.fuel_level_percentage.as_ref(),
        }
    }
}

fn responses(
    types: &[TelematicsDataType],
    response: &ServiceGrantResponse,
) -> Vec<TelematicsDataResponse> {
    let fail_all = |error| {
        types
            .iter()
            .map(|&data_type| TelematicsDataResponse::Failure { data_type, error })
            .collect()
    };
    if response.response_data == KEY_DESTROYED {
        return fail_all(TelematicsDataError::KeyDestroyed);
    }
    match response.status {
        ServiceGrantStatus::Success => {},
        ServiceGrantStatus::InvalidTimeFrame | ServiceGrantStatus::NotAllowed => {
            return fail_all(TelematicsDataError::Denied);
        },
        ServiceGrantStatus::Failure | ServiceGrantStatus::Pending => {
            return fail_all(TelematicsDataError::RemoteFailed);
        },
    }
    let readings: Readings = match serde_json::from_str(&response.response_data) {
        Ok(readings) => readings,
        Err(err) => {
            warn!(error = %err, "malformed telematics response");
            return fail_all(TelematicsDataError::RemoteFailed);
        },
    };
    types
        .iter()
        .map(|&data_type| match readings.get(data_type) {
            Some(reading) => TelematicsDataResponse::Success(TelematicsData {
                data_type,
                value: reading.value,
                unit: reading.unit.clone(),
                timestamp: reading.timestamp.clone(),
            }),
            None => TelematicsDataResponse::Failure {
                data_type,
                error: TelematicsDataError::NotSupported,
            },
        })
        .collect()
}

#[derive(Debug)]
struct Inner {
    /// Requests oldest first; the first `acknowledged` went out on the link.
    requests: Vec<Vec<TelematicsDataType>>,
    acknowledged: usize,
    subject: ChangeSubject<TelematicsDataChange>,
}

impl Inner {
    fn state(&self) -> Vec<TelematicsDataType> {
        let mut state = Vec::new();
        for data_type in self.requests.iter().flatten() {
            if !state.contains(data_type) {
                state.push(*data_type);
            }
        }
        state
    }

    fn publish(&mut self, action: TelematicsDataAction) {
        let change = TelematicsDataChange { state: self.state(), action };
        self.subject.publish(change);
    }
}

/// Owner of the telematics service grant.
#[derive(Debug, Clone)]
pub struct TelematicsManager {
    inner: Arc<Mutex<Inner>>,
    requester: ServiceGrantRequester,
}

impl TelematicsManager {
    /// Create a manager that sends its requests through `requester`.
    pub fn new(requester: ServiceGrantRequester, config: SubjectConfig) -> Self {
        let initial = TelematicsDataChange { state: Vec::new(), action: TelematicsDataAction::Initial };
        let inner = Inner {
            requests: Vec::new(),
            acknowledged: 0,
            subject: ChangeSubject::new(initial, config),
        };
        Self { inner: Arc::new(Mutex::new(inner)), requester }
    }

    /// Request readings of the given types.
    ///
    /// Emits nothing synchronously; the ack and the readings arrive on the
    /// change stream.
    pub fn request_data(&self, types: Vec<TelematicsDataType>) -> ServiceGrantId {
        let mut inner = self.inner.lock();
        inner.requests.push(types);
        if !self.requester.request(TELEMATICS_SERVICE_GRANT_ID) {
            warn!("runtime gone, telematics request dropped");
            inner.requests.pop();
        }
        TELEMATICS_SERVICE_GRANT_ID
    }

    /// Types awaiting a response.
    pub fn requested_types(&self) -> Vec<TelematicsDataType> {
        self.inner.lock().state()
    }

    /// Last change and a receiver for later ones.
    pub fn subscribe(&self) -> (TelematicsDataChange, broadcast::Receiver<TelematicsDataChange>) {
        self.inner.lock().subject.subscribe()
    }

    /// Last published change.
    pub fn last_change(&self) -> TelematicsDataChange {
        self.inner.lock().subject.last().clone()
    }
}

impl ServiceGrantConsumer for TelematicsManager {
    fn try_consume(&mut self, change: ServiceGrantChange) -> Consumption {
        let mut inner = self.inner.lock();
        match &change.action {
            ServiceGrantAction::Initial => Consumption::PassThrough(change),
            ServiceGrantAction::Reset => {
                inner.requests.clear();
                inner.acknowledged = 0;
                inner.publish(TelematicsDataAction::Reset);
                Consumption::PassThrough(change)
            },
            ServiceGrantAction::RequestServiceGrant { id, accepted } => {
                if *id != TELEMATICS_SERVICE_GRANT_ID {
                    return Consumption::PassThrough(change);
                }
                let index = inner.acknowledged;
                let Some(types) = inner.requests.get(index).cloned() else {
                    return Consumption::PassThrough(change);
                };
                if *accepted {
                    inner.acknowledged += 1;
                } else {
                    inner.requests.remove(index);
                }
                debug!(?types, accepted, "telematics request acknowledged");
                inner.publish(TelematicsDataAction::RequestingData { types, accepted: *accepted });
                Consumption::Consumed
            },
            ServiceGrantAction::ResponseReceived(response) => {
                if response.service_grant_id != TELEMATICS_SERVICE_GRANT_ID
                    || inner.requests.is_empty()
                {
                    return Consumption::PassThrough(change);
                }
                if !response.status.is_final() {
                    debug!("telematics still pending");
                    return Consumption::Consumed;
                }
                let types = inner.requests.remove(0);
                inner.acknowledged = inner.acknowledged.saturating_sub(1);
                let result = responses(&types, response);
                debug!(count = result.len(), "telematics response");
                inner.publish(TelematicsDataAction::ResponseReceived(result));
                Consumption::Consumed
            },
        }
    }
}
