//! Behavioural scenarios for the provisioning and verification tasks.

mod pipeline;
