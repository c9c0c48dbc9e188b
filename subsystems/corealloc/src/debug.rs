//! Diagnostic dumps of the allocator state, emitted through `log::info!`.

use alloc::string::String;
use core::fmt::Write;

use crate::allocator::CoreAllocator;
use crate::core_map::CoreEntry;
use crate::list::CoreList;
use crate::tree::PNode;
use crate::types::{NodeType, ProcId};

fn join(list: &CoreList) -> String {
    let mut out = String::new();
    for (i, core) in list.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{}", core);
    }
    out
}

/// Idle-pool line: id, state flags and provisioned owner
fn format_idle_core(entry: &CoreEntry) -> String {
    let mut line = String::new();
    let _ = write!(line, "core {:2}, flags: {:?}", entry.core_id(), entry.flags());
    match entry.prov_proc() {
        Some(p) => {
            let _ = write!(line, ", provisioned to {}", p);
        },
        None => line.push_str(", not provisioned"),
    }
    line
}

/// One line per node: id, level, children, refcounts from its own level down
fn format_node(tree_node: &PNode, parent: Option<&PNode>) -> String {
    let mut line = String::new();
    let _ = write!(
        line,
        "{:<7} id: {:2}, type: {}, num_children: {:2}",
        tree_node.node_type().label(),
        tree_node.id(),
        tree_node.node_type().index(),
        tree_node.children().len()
    );
    for level in NodeType::ALL.iter().rev() {
        if *level <= tree_node.node_type() {
            let _ = write!(line, ", refcount[{}]: {:2}", level.index(), tree_node.refcount(*level));
        }
    }
    if let Some(parent) = parent {
        let _ = write!(
            line,
            ", parent_id: {:2}, parent_type: {}",
            parent.id(),
            parent.node_type().index()
        );
    }
    line
}

impl CoreAllocator {
    /// Log every idle core and who it is provisioned to
    pub fn dump_idle_cores(&self) {
        for core in self.cores.idle().iter() {
            log::info!("{}", format_idle_core(self.cores.pcore_for_id(core)));
        }
    }

    /// Log every node, machine first, then Numa down to Core
    pub fn dump_nodes(&self) {
        let tree = &self.tree;
        for level in NodeType::ALL.iter().rev() {
            for id in 0..tree.num_nodes(*level) {
                let node = tree.node_by_id(*level, id);
                let parent = node.parent().map(|index| tree.node(index));
                log::info!("{}", format_node(node, parent));
            }
        }
    }

    /// Log the three lists of a process
    pub fn dump_proc(&self, p: ProcId) {
        let Some(data) = self.procs.get(&p) else {
            log::info!("{}: not registered", p);
            return;
        };
        log::info!("{} allocated: [{}]", p, join(&data.allocated));
        log::info!("{} provisioned, allocated: [{}]", p, join(&data.prov_allocated));
        log::info!("{} provisioned, not allocated: [{}]", p, join(&data.prov_unallocated));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreAllocConfig;
    use crate::topology::CpuTopologyInfo;

    #[test]
    fn test_format_node() {
        let info = CpuTopologyInfo::uniform(2, 2, 1, 2);
        let alloc = CoreAllocator::new(&info, CoreAllocConfig::new()).unwrap();
        let tree = alloc.tree();

        let cpu = tree.node_by_id(NodeType::Cpu, 0);
        let parent = cpu.parent().map(|index| tree.node(index));
        let line = format_node(cpu, parent);

        assert!(line.starts_with("CPU"));
        assert!(line.contains("num_children:  2"));
        assert!(line.contains("refcount[1]:  1, refcount[0]:  1"));
        assert!(line.contains("parent_type: 2"));

        let machine = format_node(tree.node(tree.machine()), None);
        assert!(!machine.contains("parent_id"));
    }

    #[test]
    fn test_format_idle_core() {
        let info = CpuTopologyInfo::uniform(2, 2, 1, 2);
        let mut alloc = CoreAllocator::new(&info, CoreAllocConfig::new()).unwrap();
        alloc.register_proc(ProcId(3)).unwrap();
        alloc.provision(Some(ProcId(3)), 5);

        let line = format_idle_core(alloc.entry_of(5));
        assert!(line.starts_with("core  5"));
        assert!(line.contains("PROVISIONED"));
        assert!(line.ends_with("provisioned to proc3"));

        let line = format_idle_core(alloc.entry_of(2));
        assert!(line.ends_with("not provisioned"));
        assert!(!line.contains("PROVISIONED"));
    }

    #[test]
    fn test_join() {
        let list: CoreList = [4, 1, 7].into_iter().collect();
        assert_eq!(join(&list), "4, 1, 7");
        assert_eq!(join(&CoreList::new()), "");
    }

    #[test]
    fn test_dumps_run() {
        let info = CpuTopologyInfo::uniform(1, 1, 2, 2);
        let mut alloc = CoreAllocator::new(&info, CoreAllocConfig::new()).unwrap();
        alloc.register_proc(ProcId(1)).unwrap();
        alloc.provision(Some(ProcId(1)), 3);
        alloc.dump_idle_cores();
        alloc.dump_nodes();
        alloc.dump_proc(ProcId(1));
        alloc.dump_proc(ProcId(2));
    }
}
