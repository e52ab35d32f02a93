pub mod rate_limit;
pub mod shared_spin_wheel;
