pub(crate) mod oneshot_broadcast;
