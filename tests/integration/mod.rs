mod bootstrap_recovery;
mod churn;
mod update_timeout;
