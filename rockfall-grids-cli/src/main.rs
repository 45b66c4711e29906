use anyhow::Result;
use clap::{Parser, Subcommand};
use rockfall_grids::import::DEFAULT_INTEGER_PREFIX;
use rockfall_grids::{
    convert_from_ascii, convert_to_ascii, create_feature_class, ExportConfig, FeatureClassRequest,
    ForestMode, ImportConfig, NormalizeScope, OutputFormat, Report, Separators,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// RockyFor3D用の属性フィールドを持つポリゴンレイヤーをGeoPackageに作成
    CreateFeatureClass {
        /// 出力GeoPackage
        #[arg(value_name = "GPKG")]
        geopackage: PathBuf,

        /// レイヤー名
        #[arg(short, long)]
        name: String,

        /// 出力座標系（EPSG:xxxx、WKT、PROJ文字列）
        #[arg(long)]
        srs: String,

        /// 森林の扱い（none, raster-maps, tree-file）
        #[arg(long, default_value = "none")]
        forest: ForestMode,

        /// DEMの範囲を覆うポリゴンを作成する
        #[arg(long, value_name = "DEM")]
        dem: Option<PathBuf>,
    },

    /// ポリゴンレイヤーとDEMからASCIIグリッドを作成
    ToAscii {
        /// 属性ポリゴンのデータセット
        #[arg(value_name = "FEATURES")]
        features: PathBuf,

        /// レイヤー名（デフォルト: 最初のレイヤー）
        #[arg(short, long)]
        layer: Option<String>,

        /// 基準DEM
        #[arg(long)]
        dem: PathBuf,

        /// 出力ディレクトリ
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// セルサイズ（DEM解像度の倍数）
        #[arg(short, long)]
        cell_size: f64,

        /// グリッド作成時の小数点
        #[arg(long, default_value = ".")]
        decimal_separator: String,

        /// グリッド作成時の桁区切り
        #[arg(long, default_value = "")]
        thousands_separator: String,

        /// ヘッダ行を置換対象から外す
        #[arg(long)]
        row_data_only: bool,
    },

    /// ASCIIグリッドを他のラスタ形式に変換
    FromAscii {
        /// 入力ディレクトリ
        #[arg(value_name = "INPUT_DIR")]
        input: PathBuf,

        /// 出力ディレクトリまたはGeoPackage
        #[arg(short, long, value_name = "DEST")]
        output: PathBuf,

        /// 出力形式（tiff, cloud-optimized, erdas-imagine, esri-grid）
        #[arg(short, long, default_value = "tiff")]
        format: OutputFormat,

        /// 出力に設定する座標系
        #[arg(long)]
        srs: Option<String>,

        /// 整数グリッドのファイル名接頭辞
        #[arg(long, default_value = DEFAULT_INTEGER_PREFIX)]
        integer_prefix: String,
    },
}

fn main() -> Result<()> {
    // ログの初期化
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // CLI引数の解析
    let args = Args::parse();

    // 処理開始時間を記録
    let start_time = std::time::Instant::now();

    match args.command {
        Command::CreateFeatureClass {
            geopackage,
            name,
            srs,
            forest,
            dem,
        } => {
            let request = FeatureClassRequest {
                geopackage,
                name,
                spatial_ref: srs,
                forest,
                dem,
            };
            create_feature_class(&request)?;
        }
        Command::ToAscii {
            features,
            layer,
            dem,
            output,
            cell_size,
            decimal_separator,
            thousands_separator,
            row_data_only,
        } => {
            let config = ExportConfig {
                features,
                layer,
                dem,
                output_dir: output,
                cell_size,
                separators: Separators::new(decimal_separator, thousands_separator),
                scope: if row_data_only {
                    NormalizeScope::RowData
                } else {
                    NormalizeScope::WholeFile
                },
            };
            let report = convert_to_ascii(&config)?;
            summarize(&report);
        }
        Command::FromAscii {
            input,
            output,
            format,
            srs,
            integer_prefix,
        } => {
            let config = ImportConfig {
                input_dir: input,
                destination: output,
                format,
                spatial_ref: srs,
                integer_prefix,
            };
            let report = convert_from_ascii(&config)?;
            summarize(&report);
        }
    }

    // 処理時間を表示
    let elapsed = start_time.elapsed();
    info!("Total processing time: {:?}", elapsed);

    Ok(())
}

fn summarize(report: &Report) {
    info!(
        "{} created, {} skipped",
        report.created.len(),
        report.skipped.len()
    );
    if !report.warnings.is_empty() {
        warn!("Finished with {} warnings:", report.warnings.len());
        for warning in &report.warnings {
            warn!("  {}", warning);
        }
    }
}
