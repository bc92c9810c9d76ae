//! Startup and infrastructure errors. Request-level failures live in `types::ApiError`.

error_chain! {
    foreign_links {
        Var(::std::env::VarError);
        ParseInt(::std::num::ParseIntError);
        R2D2(::r2d2::Error);
        Connection(::diesel::ConnectionError);
        Diesel(::diesel::result::Error);
    }

    errors {
        MissingSetting(name: &'static str) {
            description("missing required setting")
            display("missing required setting: {}", name)
        }
        InvalidSetting(name: &'static str, value: String) {
            description("invalid setting")
            display("invalid setting {}: {:?}", name, value)
        }
        Migration(reason: String) {
            description("failed to run database migrations")
            display("failed to run database migrations: {}", reason)
        }
    }
}
