pub mod scaling_policy;
