mod pipeline_test;
mod retries_test;
mod routing_test;
mod sharding_test;
