//! Default functions for serde defaults in CRD specs.

pub fn replicas() -> i32 {
    crate::constants::defaults::REPLICAS
}

pub fn create_bootstrap_service() -> bool {
    true
}

pub fn gc_logging_enabled() -> bool {
    true
}

pub fn ca_validity_days() -> u32 {
    crate::constants::defaults::CA_VALIDITY_DAYS
}

pub fn ca_renewal_days() -> u32 {
    crate::constants::defaults::CA_RENEWAL_DAYS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(replicas(), 3);
        assert!(create_bootstrap_service());
        assert!(gc_logging_enabled());
        assert!(ca_renewal_days() < ca_validity_days());
    }
}
