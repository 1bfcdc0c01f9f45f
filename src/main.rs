use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ledgerlink_lib::api::proffix::DEFAULT_BASE_URL;
use ledgerlink_lib::config::default_config_dir;
use ledgerlink_lib::core::list_remote_files;
use ledgerlink_lib::logging::{get_log_dir, init_logging};
use ledgerlink_lib::{
    create_remote_api, AppConfig, CategoryTarget, CategoryTree, DirectoryMirror, ProffixClient,
    RemoteApi, ResourceKind,
};

#[derive(Parser)]
#[command(name = "ledgerlink")]
#[command(about = "CashCtrl / PROFFIX command-line client", long_about = None)]
struct Cli {
    /// 配置目录（默认为用户配置目录下的 ledgerlink）
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// 同时把日志输出到控制台
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 分类树
    #[command(subcommand)]
    Categories(CategoriesCommand),
    /// 远程文件
    #[command(subcommand)]
    Files(FilesCommand),
    /// 把本地目录镜像到 CashCtrl 文件
    Mirror {
        directory: PathBuf,
        #[arg(long)]
        delete_files: bool,
        #[arg(long)]
        delete_categories: bool,
    },
    /// PROFFIX 服务器
    #[command(subcommand)]
    Proffix(ProffixCommand),
}

#[derive(Subcommand)]
enum CategoriesCommand {
    List {
        /// account, article, asset, file, person
        resource: ResourceKind,
        #[arg(long)]
        system: bool,
    },
    /// 按 JSON 文件（路径数组，或 account 的路径→编号对象）调整分类
    Update {
        resource: ResourceKind,
        target: PathBuf,
        #[arg(long)]
        delete: bool,
        #[arg(long)]
        ignore_root_nodes: bool,
        /// 只打印计划
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum FilesCommand {
    List,
    Download { id: i64, output: PathBuf },
}

#[derive(Subcommand)]
enum ProffixCommand {
    Info {
        #[arg(long)]
        key: String,
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        base_url: String,
    },
    Databases {
        #[arg(long)]
        key: String,
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        base_url: String,
    },
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_dir = cli.config_dir.unwrap_or_else(default_config_dir);
    let config = AppConfig::load(&config_dir);
    init_logging(&get_log_dir(), &config.log, cli.verbose);

    match cli.command {
        Command::Categories(CategoriesCommand::List { resource, system }) => {
            let tree = CategoryTree::new(create_remote_api(&config)?);
            let table = tree.list_categories(resource, system).await?;
            print_json(&table.rows())?;
        }
        Command::Categories(CategoriesCommand::Update {
            resource,
            target,
            delete,
            ignore_root_nodes,
            dry_run,
        }) => {
            let raw = std::fs::read_to_string(&target)
                .with_context(|| format!("cannot read {}", target.display()))?;
            let target = CategoryTarget::from_json(&serde_json::from_str(&raw)?)?;
            let tree = CategoryTree::new(create_remote_api(&config)?);
            if dry_run {
                let plan = tree
                    .plan_update(resource, &target, delete, ignore_root_nodes)
                    .await?;
                print_json(&plan)?;
            } else {
                let report = tree
                    .update_categories(resource, &target, delete, ignore_root_nodes)
                    .await?;
                print_json(&report)?;
            }
        }
        Command::Files(FilesCommand::List) => {
            let api = create_remote_api(&config)?;
            print_json(&list_remote_files(api.as_ref()).await?)?;
        }
        Command::Files(FilesCommand::Download { id, output }) => {
            let api = create_remote_api(&config)?;
            let bytes = api.download_file(id).await?;
            std::fs::write(&output, &bytes)
                .with_context(|| format!("cannot write {}", output.display()))?;
            println!("{} bytes -> {}", bytes.len(), output.display());
        }
        Command::Mirror {
            directory,
            delete_files,
            delete_categories,
        } => {
            let mirror = DirectoryMirror::new(create_remote_api(&config)?);
            let report = mirror
                .mirror_directory(&directory, delete_files, delete_categories)
                .await?;
            print_json(&report)?;
        }
        Command::Proffix(ProffixCommand::Info { key, base_url }) => {
            print_json(&ProffixClient::info(&key, &base_url).await?)?;
        }
        Command::Proffix(ProffixCommand::Databases { key, base_url }) => {
            print_json(&ProffixClient::databases(&key, &base_url).await?)?;
        }
    }

    Ok(())
}
