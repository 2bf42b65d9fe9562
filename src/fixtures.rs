#[cfg(test)]
pub mod test {
    use std::collections::HashMap;
    use std::time::Duration;

    use crate::Settings;

    #[derive(Settings, Debug, Default, Clone, PartialEq)]
    pub struct RedisSettings {
        #[config(key = "addr", default = "localhost:6379")]
        pub addr: String,

        #[config(key = "db", default = "0")]
        pub db: u8,

        #[config(key = "tags", default = "a,b")]
        pub tags: Vec<String>,

        #[config(key = "labels")]
        pub labels: HashMap<String, String>,

        #[config(key = "backoff")]
        pub backoff: Backoff,

        #[config(key = "endpoints")]
        pub endpoints: Vec<Endpoint>,

        /// Not bound.
        pub scratch: String,
    }

    #[derive(Settings, Debug, Default, Clone, PartialEq)]
    pub struct Backoff {
        #[config(key = "attempts")]
        pub attempts: u16,

        #[config(key = "max_elapsed_time", default = "10m")]
        pub max_elapsed_time: Duration,
    }

    #[derive(Settings, Debug, Default, Clone, PartialEq)]
    pub struct Endpoint {
        #[config(key = "name")]
        pub name: String,

        #[config(flatten)]
        pub address: Address,
    }

    #[derive(Settings, Debug, Default, Clone, PartialEq)]
    pub struct Address {
        #[config(key = "host")]
        pub host: String,

        #[config(key = "port")]
        pub port: u16,
    }

    #[derive(Settings, Debug, Default, Clone, PartialEq)]
    pub struct Shouter {
        #[config(key = "word")]
        pub word: String,

        #[config(key = "raw", nodecode)]
        pub raw: String,

        #[config(key = "letter")]
        pub letter: char,
    }

    #[derive(Settings, Debug, Default, Clone, PartialEq)]
    pub struct Route {
        #[config(key = "name")]
        pub name: String,

        #[config(key = "pattern", nodecode)]
        pub pattern: String,
    }

    #[derive(Settings, Debug, Default, Clone, PartialEq)]
    pub struct BrokenDefault {
        #[config(key = "port", default = "eighty")]
        pub port: u16,
    }

    #[derive(Settings, Debug, Default, Clone, PartialEq)]
    pub struct Validated {
        #[config(key = "mode", validate = "required,oneof=sync async")]
        pub mode: String,

        #[config(key = "name", validate = "min=3")]
        pub name: String,

        #[config(key = "port", validate = "omitempty,gte=1024")]
        pub port: u16,

        #[config(key = "username")]
        pub username: String,

        #[config(key = "password", validate = "required_with=username")]
        pub password: String,

        #[config(key = "queue", validate = "required_unless=mode sync")]
        pub queue: String,
    }

    #[derive(Settings, Debug, Default, Clone, PartialEq)]
    pub struct Fleet {
        #[config(key = "hosts", validate = "dive,required")]
        pub hosts: Vec<String>,

        #[config(key = "primary")]
        pub primary: Validated,
    }
}
