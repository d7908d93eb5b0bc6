use std::env::{self, consts};
use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Result};

/// Binding options resolved from the local verbs installation.
#[derive(Debug, Clone)]
struct Bindings {
    includes: Vec<String>,
    linkages: Vec<String>,
}

/// Locate a legacy MLNX_OFED (v4.x) installation.
///
/// The experimental verbs surface (`ibv_exp_*`, masked atomics, XRC SRQs)
/// only exists in MLNX_OFED v4.x; RDMA-Core removed it.
fn link_ibverbs_legacy() -> Result<Bindings> {
    let output = Command::new("ofed_info").arg("-n").output().map_err(|_| {
        anyhow!("failed to run `ofed_info`, which is required to link to legacy MLNX_OFED versions")
    })?;

    // Parse the version number until the first period (`.`).
    let ver_num = output
        .stdout
        .iter()
        .take_while(|&&c| c != b'.')
        .copied()
        .collect::<Vec<_>>();
    let ver_num = String::from_utf8(ver_num)
        .map_err(|e| anyhow!("failed to parse `ofed_info` output: {:?}", e))?
        .parse::<u32>()
        .map_err(|e| anyhow!("failed to parse version number: {:?}", e))?;
    if ver_num != 4 {
        return Err(anyhow!(
            "unsupported MLNX_OFED version {}; the experimental verbs surface needs v4.x",
            ver_num
        ));
    }

    // MLNX_OFED v4.9-x LTS will not register the `libibverbs` library to
    // `pkg-config`, so search for it manually.
    //
    // We assume the default installation path as `/usr`.
    // By default, we do not need to specify the include and library paths,
    // as they are already in the default search paths.
    const DEFAULT_INSTALLATION_PATH: &str = "/usr/lib";
    let libdir_str = if let Ok(lib_dir) = env::var("MLNX_OFED_LIB_DIR") {
        lib_dir
    } else {
        DEFAULT_INSTALLATION_PATH.to_owned()
    };
    let lib_dir = Path::new(&libdir_str);

    const LIBRARIES: [&str; 3] = ["ibverbs", "mlx5", "mlx4"];
    let mut linkages = Vec::new();
    for lib in LIBRARIES {
        let lib_name = format!("{}{}{}", consts::DLL_PREFIX, lib, consts::DLL_SUFFIX);
        if lib_dir.join(lib_name).exists() {
            println!("cargo:rustc-link-search=native={}", lib_dir.display());
            linkages.push(lib.to_owned());
            continue;
        }
        assert!(
            lib != "ibverbs",
            "cannot find ibverbs library; you may use `MLNX_OFED_LIB_DIR` to specify a path"
        );
    }

    let includes = if let Ok(includes) = env::var("MLNX_OFED_INCLUDE_DIR") {
        includes
            .split(':')
            .map(|p| p.to_owned())
            .collect::<Vec<_>>()
    } else {
        Vec::new()
    };
    Ok(Bindings { includes, linkages })
}

fn main() {
    // Refuse to compile on non-64-bit or non-Linux platforms.
    if cfg!(not(target_pointer_width = "64")) {
        panic!("`rdmesh` only supports 64-bit platforms");
    }
    if cfg!(not(target_os = "linux")) {
        panic!("`rdmesh` only supports Linux platforms");
    }

    match link_ibverbs_legacy() {
        Ok(bindings) => gen_verb_bindings(bindings),
        Err(e) => panic!("{:?}", e),
    }
}

fn gen_verb_bindings(bindings: Bindings) {
    // Linkages.
    for lib in bindings.linkages {
        println!("cargo:rustc-link-lib={}", lib);
    }

    // Includes.
    let include_args = bindings.includes.iter().map(|p| format!("-I{}", p));

    let builder = bindgen::builder()
        .clang_args(include_args)
        .header("src/bindings/verbs.h")
        .allowlist_function("ibv_.*")
        .allowlist_type("ibv_.*")
        .allowlist_type("verbs_.*")
        .allowlist_type("ib_uverbs_access_flags")
        .blocklist_type("pthread_.*")
        .blocklist_type("in6_addr")
        .blocklist_type("sockaddr.*")
        .blocklist_type("timespec")
        // Types containing untagged unions that bindgen cannot express
        // faithfully; hand-written in `src/bindings/`.
        .blocklist_type("ibv_ah_attr")
        .blocklist_type("ibv_async_event")
        .blocklist_type("ibv_flow_spec")
        .blocklist_type("ibv_gid")
        .blocklist_type("ibv_global_route")
        .blocklist_type("ibv_send_wr.*")
        .blocklist_type("ibv_exp_send_wr.*")
        .blocklist_type("ibv_wc")
        .bitfield_enum("verbs_context_mask")
        .bitfield_enum("ibv_access_flags")
        .bitfield_enum("ibv_send_flags")
        .bitfield_enum("ibv_wc_flags")
        .bitfield_enum("ibv_qp_attr_mask")
        .bitfield_enum("ibv_xrcd_init_attr_mask")
        .constified_enum_module("ibv_mtu")
        .constified_enum_module("ibv_port_state")
        .constified_enum_module("ibv_wc_status")
        .constified_enum_module("ibv_wc_opcode")
        .constified_enum_module("ibv_srq_type")
        .constified_enum_module("ibv_qp_type")
        .constified_enum_module("ibv_qp_state")
        .constified_enum_module("ibv_wr_opcode")
        .constified_enum_module("ibv_exp_wr_opcode")
        .constified_enum_module("ibv_exp_calc_op")
        .constified_enum_module("ibv_exp_calc_data_type")
        .constified_enum_module("ibv_exp_calc_data_size")
        .rustified_enum("ibv_event_type");

    let bindings = builder
        .derive_copy(true)
        .derive_debug(true)
        .derive_default(true)
        .generate_comments(true)
        .layout_tests(false)
        .prepend_enum_name(false)
        .size_t_is_usize(true)
        .disable_untagged_union()
        .generate()
        .expect("failed to generate bindings");

    let out_dir = env::var_os("OUT_DIR").unwrap();
    let dest = Path::new(&out_dir).join("verbs_bindings.rs");
    bindings
        .write_to_file(dest)
        .expect("failed to write bindings");
}
