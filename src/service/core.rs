//! Paid services: things a member offers to do for the rest of the family at
//! a fixed price.

use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error, FamilyId, MemberId, Money, Patch, ServiceId, UserId,
    db::begin_immediate,
    family::{
        Scope,
        gate::{require_member, require_party_or_admin},
        get_member_of_family,
    },
    ledger::{EventType, LedgerPolicy, NewTransactionEvent, TransactionEvent, post_event_in},
    pagination::Paging,
};

/// The status a service has unless told otherwise. Only services with this
/// status are listed and can be bought.
pub const ACTIVE: &str = "active";

/// A service a member offers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
    /// The ID of the service.
    pub id: ServiceId,
    /// The family the service is offered in.
    pub family_id: FamilyId,
    /// What the provider offers to do.
    pub title: String,
    /// What a buyer pays the provider.
    pub price: Money,
    /// The member offering the service.
    pub provider_id: MemberId,
    /// A label such as `active` or `inactive`.
    pub status: String,
    /// When the service was offered.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The data needed to offer a service.
#[derive(Debug, Clone, Deserialize)]
pub struct NewService {
    /// The family to offer the service in.
    pub family_id: FamilyId,
    /// What the provider offers to do.
    pub title: String,
    /// What a buyer pays the provider.
    pub price: Money,
    /// The member offering the service, the caller's membership if not given.
    #[serde(default)]
    pub provider_id: Option<MemberId>,
    /// The initial status, [ACTIVE] if not given.
    #[serde(default)]
    pub status: Option<String>,
}

/// A change to a service.
#[derive(Debug, Default, Deserialize)]
pub struct ServiceUpdate {
    /// The new title.
    #[serde(default)]
    pub title: Patch<String>,
    /// The new price.
    #[serde(default)]
    pub price: Patch<Money>,
    /// The new status.
    #[serde(default)]
    pub status: Patch<String>,
}

/// Create the service table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_service_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS service (
                id TEXT PRIMARY KEY,
                family_id TEXT NOT NULL REFERENCES family(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                price INTEGER NOT NULL CHECK (price > 0),
                provider_id TEXT NOT NULL REFERENCES family_member(id),
                status TEXT NOT NULL CHECK (status <> ''),
                created_at TEXT NOT NULL
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_service_family ON service(family_id)",
        (),
    )?;

    Ok(())
}

fn validate(service: &Service) -> Result<(), Error> {
    if service.title.trim().is_empty() {
        return Err(Error::InvalidInput("the title cannot be empty".to_owned()));
    }

    if !service.price.is_positive() {
        return Err(Error::InvalidInput(
            "the price must be greater than zero".to_owned(),
        ));
    }

    if service.status.trim().is_empty() {
        return Err(Error::InvalidInput("the status cannot be empty".to_owned()));
    }

    Ok(())
}

/// Offer a new service.
///
/// # Errors
///
/// Returns:
/// - [Error::Forbidden] if `actor` is not a member of the family,
/// - [Error::NotFound] if the provider is not part of the family,
/// - [Error::InvalidInput] if the title or status is blank or the price not
///   positive.
pub fn create_service(
    new_service: NewService,
    actor: UserId,
    connection: &Connection,
) -> Result<Service, Error> {
    let membership = require_member(actor, new_service.family_id, connection)?;
    let provider_id = new_service.provider_id.unwrap_or(membership.id);
    get_member_of_family(provider_id, new_service.family_id, "provider", connection)?;

    let service = Service {
        id: ServiceId::new_random(),
        family_id: new_service.family_id,
        title: new_service.title.trim().to_owned(),
        price: new_service.price,
        provider_id,
        status: new_service
            .status
            .map(|status| status.trim().to_owned())
            .unwrap_or_else(|| ACTIVE.to_owned()),
        created_at: OffsetDateTime::now_utc(),
    };
    validate(&service)?;

    connection.execute(
        "INSERT INTO service (id, family_id, title, price, provider_id, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        (
            service.id,
            service.family_id,
            &service.title,
            service.price,
            service.provider_id,
            &service.status,
            service.created_at,
        ),
    )?;

    Ok(service)
}

const SELECT_SERVICE: &str =
    "SELECT id, family_id, title, price, provider_id, status, created_at FROM service";

fn map_service_row(row: &Row) -> Result<Service, rusqlite::Error> {
    Ok(Service {
        id: row.get(0)?,
        family_id: row.get(1)?,
        title: row.get(2)?,
        price: row.get(3)?,
        provider_id: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Get the service with `service_id`, whatever its status.
///
/// # Errors
///
/// Returns an [Error::NotFound] if the service does not exist.
pub fn get_service(service_id: ServiceId, connection: &Connection) -> Result<Service, Error> {
    connection
        .prepare(&format!("{SELECT_SERVICE} WHERE id = ?1"))?
        .query_row([service_id], map_service_row)
        .optional()?
        .ok_or(Error::NotFound("service"))
}

/// List the active services in the order they were offered.
///
/// For [Scope::User], the services provided by one of the user's memberships
/// are listed.
pub fn list_services(
    scope: Scope,
    paging: Paging,
    connection: &Connection,
) -> Result<Vec<Service>, Error> {
    let (filter, id) = match scope {
        Scope::Family(family_id) => ("family_id = ?1", family_id.to_string()),
        Scope::User(user_id) => (
            "provider_id IN (SELECT id FROM family_member WHERE user_id = ?1)",
            user_id.to_string(),
        ),
    };

    connection
        .prepare(&format!(
            "{SELECT_SERVICE} WHERE ({filter}) AND status = ?2 ORDER BY rowid LIMIT ?3 OFFSET ?4"
        ))?
        .query_map((id, ACTIVE, paging.limit, paging.offset), map_service_row)?
        .map(|maybe_service| maybe_service.map_err(Error::from))
        .collect()
}

/// Apply `update` to a service. Only its provider or a family admin may do this.
///
/// # Errors
///
/// Returns an [Error::NotFound] if the service does not exist, an
/// [Error::Forbidden] if `actor` is neither the provider nor an admin, or an
/// [Error::InvalidInput] if the result would not be a valid service.
pub fn update_service(
    service_id: ServiceId,
    update: ServiceUpdate,
    actor: UserId,
    connection: &Connection,
) -> Result<Service, Error> {
    let mut service = get_service(service_id, connection)?;
    require_party_or_admin(actor, service.family_id, &[service.provider_id], connection)?;

    update.title.apply_to_required(&mut service.title, "title")?;
    update.price.apply_to_required(&mut service.price, "price")?;
    update.status.apply_to_required(&mut service.status, "status")?;
    service.title = service.title.trim().to_owned();
    service.status = service.status.trim().to_owned();
    validate(&service)?;

    connection.execute(
        "UPDATE service SET title = ?1, price = ?2, status = ?3 WHERE id = ?4",
        (&service.title, service.price, &service.status, service.id),
    )?;

    Ok(service)
}

/// Delete a service. Only its provider or a family admin may do this.
///
/// # Errors
///
/// Returns an [Error::NotFound] if the service does not exist, or an
/// [Error::Forbidden] if `actor` is neither the provider nor an admin.
pub fn delete_service(
    service_id: ServiceId,
    actor: UserId,
    connection: &Connection,
) -> Result<(), Error> {
    let service = get_service(service_id, connection)?;
    require_party_or_admin(actor, service.family_id, &[service.provider_id], connection)?;

    connection.execute("DELETE FROM service WHERE id = ?1", [service.id])?;

    Ok(())
}

/// Buy a service: the caller's membership pays the provider the service's price.
///
/// # Errors
///
/// Returns:
/// - [Error::NotFound] if the service does not exist,
/// - [Error::Forbidden] if `actor` is not a member of the service's family,
/// - [Error::InvalidInput] if the service is not active or the caller is
///   its provider,
/// - [Error::InsufficientBalance] if the buyer cannot pay.
pub fn purchase_service(
    service_id: ServiceId,
    actor: UserId,
    policy: &LedgerPolicy,
    connection: &Connection,
) -> Result<TransactionEvent, Error> {
    let transaction = begin_immediate(connection)?;
    let service = get_service(service_id, &transaction)?;
    let buyer = require_member(actor, service.family_id, &transaction)?;

    if service.status != ACTIVE {
        return Err(Error::InvalidInput(format!(
            "the service is {}, not {ACTIVE}",
            service.status
        )));
    }

    if buyer.id == service.provider_id {
        return Err(Error::InvalidInput(
            "you cannot buy your own service".to_owned(),
        ));
    }

    let event = post_event_in(
        NewTransactionEvent {
            family_id: service.family_id,
            event_type: EventType::Service,
            amount: service.price,
            from_member_id: Some(buyer.id),
            to_member_id: Some(service.provider_id),
            reference_id: Some(service.id.into()),
            description: Some(format!("Service: {}", service.title)),
        },
        actor,
        policy,
        &transaction,
    )?;

    transaction.commit()?;
    tracing::info!("Member {} bought service {}", buyer.id, service.id);

    Ok(event)
}
