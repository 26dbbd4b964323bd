// EVC-net ajax endpoints
//
// Each method maps to one `{handler, method}` pair of the portal's async
// services and decodes element 0 of the response envelope.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::Session;
use crate::client::{AjaxCall, PortalClient, Reply};
use crate::error::Error;
use crate::models::{RawActionResult, RawLogRow, RawSpot, RawStatusRow, RawUsage};
use crate::transport::Transport;

const DASHBOARD: &str = "\\LMS\\EV\\AsyncServices\\DashboardAsyncService";
const RECHARGE_SPOTS: &str = "\\LMS\\EV\\AsyncServices\\RechargeSpotsAsyncService";

/// A station command as the portal names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortalAction {
    StartTransaction,
    StopTransaction,
    SoftReset,
    HardReset,
    UnlockConnector,
    Block,
    Unblock,
}

impl PortalAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StartTransaction => "StartTransaction",
            Self::StopTransaction => "StopTransaction",
            Self::SoftReset => "SoftReset",
            Self::HardReset => "HardReset",
            Self::UnlockConnector => "UnlockConnector",
            Self::Block => "Block",
            Self::Unblock => "Unblock",
        }
    }
}

/// Identifiers attached to a `StartTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartIdentifiers {
    pub card_id: String,
    pub customer_id: String,
}

/// Rows may arrive flat (`[{..}]`) or wrapped once more (`[[{..}]]`).
#[derive(Deserialize)]
#[serde(untagged)]
enum Rows<T> {
    Nested(Vec<Vec<T>>),
    Flat(Vec<T>),
}

impl<T> Rows<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Flat(rows) => rows,
            Self::Nested(groups) => groups.into_iter().flatten().collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Transport> PortalClient<T> {
    /// List the recharge spots visible to the account.
    pub async fn network_overview(&self, session: &Session) -> Result<Reply<Vec<RawSpot>>, Error> {
        let call = AjaxCall::new(DASHBOARD, "networkOverview", json!({ "mode": "id" }));
        let reply: Reply<Rows<RawSpot>> = self.ajax_as(session, &call).await?;
        Ok(reply.map(Rows::into_vec))
    }

    /// Current per-channel status rows of one spot.
    pub async fn spot_overview(
        &self,
        session: &Session,
        spot_id: &str,
    ) -> Result<Reply<Vec<RawStatusRow>>, Error> {
        let call = AjaxCall::new(
            RECHARGE_SPOTS,
            "overview",
            json!({ "rechargeSpotId": spot_id }),
        );
        let reply: Reply<Rows<RawStatusRow>> = self.ajax_as(session, &call).await?;
        Ok(reply.map(Rows::into_vec))
    }

    /// Cumulative energy delivered by one spot.
    pub async fn total_usage(
        &self,
        session: &Session,
        spot_id: &str,
    ) -> Result<Reply<Option<RawUsage>>, Error> {
        let call = AjaxCall::new(
            DASHBOARD,
            "totalUsage",
            json!({
                "mode": "rechargeSpot",
                "rechargeSpotIds": [spot_id],
                "maxCache": 3600,
            }),
        );
        let reply: Reply<OneOrMany<RawUsage>> = self.ajax_as(session, &call).await?;
        Ok(reply.map(|usage| match usage {
            OneOrMany::One(u) => Some(u),
            OneOrMany::Many(list) => list.into_iter().next(),
        }))
    }

    /// Past charging sessions of one channel, in portal order.
    pub async fn spot_log(
        &self,
        session: &Session,
        spot_id: &str,
        channel: u8,
    ) -> Result<Reply<Vec<RawLogRow>>, Error> {
        let call = AjaxCall::new(
            RECHARGE_SPOTS,
            "log",
            json!({ "rechargeSpotId": spot_id, "channel": channel.to_string() }),
        );
        let reply: Reply<Rows<RawLogRow>> = self.ajax_as(session, &call).await?;
        Ok(reply.map(Rows::into_vec))
    }

    /// Issue a station command on one channel.
    pub async fn action(
        &self,
        session: &Session,
        spot_id: &str,
        channel: u8,
        action: PortalAction,
        identifiers: Option<&StartIdentifiers>,
    ) -> Result<Reply<RawActionResult>, Error> {
        let mut params = json!({
            "action": action.as_str(),
            "rechargeSpotId": spot_id,
            "clickedButtonId": 0,
            "channel": channel.to_string(),
        });
        if let (Some(ids), Value::Object(map)) = (identifiers, &mut params) {
            map.insert("customer".into(), Value::String(ids.customer_id.clone()));
            map.insert("card".into(), Value::String(ids.card_id.clone()));
        }

        let call = AjaxCall::new(RECHARGE_SPOTS, "action", params);
        let reply = self.ajax(session, &call).await?;
        Ok(reply.map(|value| serde_json::from_value(value).unwrap_or_default()))
    }
}
