#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
//! Reference mesh node client.
//!
//! A node is a set of addressable [`element::Element`]s, each hosting one or
//! more [`models::Model`]s. The node registers itself with an external
//! network-management daemon (consumed through [`interface::ManagementService`])
//! and walks the membership lifecycle driven by [`lifecycle::NodeLifecycle`]:
//!
//! | State        | Meaning                                          |
//! | ------------ | ------------------------------------------------ |
//! | Unregistered | No identity on the network                       |
//! | Joining      | Provisioning requested, waiting for completion   |
//! | Joined       | Holds a token, not attached to the daemon        |
//! | Attached     | Attach requested, waiting for the reply          |
//! | Configured   | Attached and element configuration applied       |
//! | Removed      | Token permanently invalidated                    |
//!
//! Periodic model publication runs on [`publication::PublicationScheduler`]
//! timer tasks; inbound traffic is dispatched by [`router::MessageRouter`].

pub mod access;
pub mod address;
pub mod element;
pub mod interface;
pub mod lifecycle;
pub mod mesh;
pub mod models;
pub mod publication;
pub mod router;
pub mod storage;
pub mod uuid;
