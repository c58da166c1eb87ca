use crate::store::Store;

use super::init_store;

pub fn run_config_get(data_dir: String, key: String) -> anyhow::Result<()> {
    let store = init_store(&data_dir)?;
    match store.get_config(&key)? {
        Some(value) => println!("{value}"),
        None => anyhow::bail!("config key not found: {key}"),
    }
    Ok(())
}

pub fn run_config_set(data_dir: String, key: String, value: String) -> anyhow::Result<()> {
    let store = init_store(&data_dir)?;
    store.set_config(&key, &value)?;
    println!("{key} = {value}");
    Ok(())
}

pub fn run_config_list(data_dir: String) -> anyhow::Result<()> {
    let store = init_store(&data_dir)?;
    for (key, value) in store.get_all_config()? {
        println!("{key} = {value}");
    }
    Ok(())
}
