use std::str::FromStr;

lazy_static! {
    pub static ref ENV_ARDRONE_ADDR: String =
        get_env_str("ENV_ARDRONE_ADDR", String::from("192.168.1.1"));
    pub static ref ENV_ARDRONE_CMD_PORT: u16 = get_env("ENV_ARDRONE_CMD_PORT", 5556);
    pub static ref ENV_ARDRONE_NAVDATA_PORT: u16 = get_env("ENV_ARDRONE_NAVDATA_PORT", 5554);
    pub static ref ENV_ARDRONE_VIDEO_PORT: u16 = get_env("ENV_ARDRONE_VIDEO_PORT", 5555);
    pub static ref ENV_ARDRONE_CTRL_PORT: u16 = get_env("ENV_ARDRONE_CTRL_PORT", 5559);
    pub static ref ENV_ARDRONE_DUMP_DIR: String =
        get_env_str("ENV_ARDRONE_DUMP_DIR", String::new());
}

pub fn get_env_str(name: &str, value: String) -> String {
    return std::env::var(name).unwrap_or(value);
}

pub fn get_env<T: FromStr>(name: &str, value: T) -> T {
    let r = std::env::var(name);
    if r.is_err() {
        return value;
    }
    let r = r.unwrap().parse::<T>();
    if let Ok(res) = r {
        res
    } else {
        value
    }
}
